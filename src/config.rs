//! Tunable parameters of the order tracer and their validation.
//!
//! [`TraceConfig`] mirrors the parameters an instrument configuration provides
//! for the order-definition step. Integer fields are signed so that
//! out-of-domain values coming from settings files or bindings can be
//! reported as value errors instead of being silently wrapped.
//!
//! Validation happens exactly once, in [`TraceConfig::validate`], which turns
//! the user-facing config into the [`TraceParams`] the pipeline stages use.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use tracing::info;

use crate::error::{Result, TraceError};

/// Pixel neighbourhood used when grouping signal pixels into clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Edge neighbours only (left, right, up, down).
    #[default]
    Four,
    /// Edge and corner neighbours.
    Eight,
}

/// Configuration for order tracing.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Minimum number of pixels in a cluster for it to become a trace.
    /// Negative values behave like 0.
    /// Default: 500
    pub min_cluster: i64,

    /// Width (in rows) of the vertical boxcar used to model the background.
    /// Must be positive.
    /// Default: 120
    pub filter_size: i64,

    /// Pixels brighter than `background + noise` are marked as order signal.
    /// Default: 8.0
    pub noise: f64,

    /// Degree of the polynomial fitted to each order. Must be non-negative.
    /// Default: 4
    pub opower: i64,

    /// Number of columns trimmed from each end of a cluster's column span.
    /// Must be non-negative.
    /// Default: 5
    pub border_width: i64,

    /// Hand the automatic traces to a [`TraceEditor`](crate::TraceEditor)
    /// before returning.
    /// Default: false
    pub manual: bool,

    /// Pass the final traces to a [`TracePlotter`](crate::TracePlotter).
    /// Never changes the returned data.
    /// Default: false
    pub plot: bool,

    /// Minimum number of columns a cluster must span. 0 disables the check.
    /// Default: 0
    pub min_width: i64,

    /// Neighbourhood used for connected-component labeling.
    /// Default: [`Connectivity::Four`]
    pub connectivity: Connectivity,

    /// Fragments of one order on either side of a gap are merged when their
    /// polynomials, extrapolated across the gap, agree to within this many
    /// rows. 0 disables merging.
    /// Default: 1.0
    pub merge_tolerance: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            min_cluster: 500,
            filter_size: 120,
            noise: 8.0,
            opower: 4,
            border_width: 5,
            manual: false,
            plot: false,
            min_width: 0,
            connectivity: Connectivity::Four,
            merge_tolerance: 1.0,
        }
    }
}

/// Validated parameters, in the units the pipeline stages work with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceParams {
    pub min_cluster: usize,
    pub filter_size: usize,
    pub noise: f64,
    pub degree: usize,
    pub border_width: usize,
    pub min_width: usize,
    pub connectivity: Connectivity,
    pub merge_tolerance: f64,
    pub manual: bool,
    pub plot: bool,
}

impl TraceConfig {
    /// Check every parameter and convert to [`TraceParams`].
    ///
    /// Pure; performs no array work.
    pub fn validate(&self) -> Result<TraceParams> {
        if self.noise.is_nan() {
            return Err(TraceError::type_err("noise must be a number, got NaN"));
        }
        if self.filter_size <= 0 {
            return Err(TraceError::value_err(format!(
                "filter_size must be positive, got {}",
                self.filter_size
            )));
        }
        if self.border_width < 0 {
            return Err(TraceError::value_err(format!(
                "border_width must be non-negative, got {}",
                self.border_width
            )));
        }
        if self.opower < 0 {
            return Err(TraceError::value_err(format!(
                "opower (polynomial degree) must be non-negative, got {}",
                self.opower
            )));
        }
        if self.merge_tolerance.is_nan() {
            return Err(TraceError::type_err("merge_tolerance must be a number, got NaN"));
        }
        if self.merge_tolerance < 0.0 {
            return Err(TraceError::value_err(format!(
                "merge_tolerance must be non-negative, got {}",
                self.merge_tolerance
            )));
        }
        if self.min_width < 0 {
            return Err(TraceError::value_err(format!(
                "min_width must be non-negative, got {}",
                self.min_width
            )));
        }

        // degree + 1 coefficients must fit an array dimension
        let degree = to_usize(self.opower, "opower")?;
        if degree >= isize::MAX as usize {
            return Err(TraceError::value_err(format!(
                "opower (polynomial degree) {} is too large",
                self.opower
            )));
        }

        Ok(TraceParams {
            min_cluster: to_usize(self.min_cluster.max(0), "min_cluster")?,
            filter_size: to_usize(self.filter_size, "filter_size")?,
            noise: self.noise,
            degree,
            border_width: to_usize(self.border_width, "border_width")?,
            min_width: to_usize(self.min_width, "min_width")?,
            connectivity: self.connectivity,
            merge_tolerance: self.merge_tolerance,
            manual: self.manual,
            plot: self.plot,
        })
    }

    /// Build a config from an instrument settings object (the `"orders"`
    /// section of a reduction configuration).
    ///
    /// Recognised keys: `min_cluster`, `filter_size`, `noise`, `degree`
    /// (or `opower`), `border_width`, `manual`, `plot`, `min_width`,
    /// `merge_tolerance`.
    /// Missing and `null` keys keep their defaults; unknown keys are ignored.
    /// A key holding the wrong JSON kind is a [`TraceError::Type`].
    pub fn from_settings(settings: &Value) -> Result<Self> {
        let obj = settings.as_object().ok_or_else(|| {
            TraceError::type_err(format!(
                "order settings must be a JSON object, got {}",
                json_kind(settings)
            ))
        })?;

        let mut config = TraceConfig::default();
        let field = |key: &str| obj.get(key).filter(|v| !v.is_null());

        if let Some(v) = field("min_cluster") {
            config.min_cluster = json_integer(v, "min_cluster")?;
        }
        if let Some(v) = field("filter_size") {
            config.filter_size = json_integer(v, "filter_size")?;
        }
        if let Some(v) = field("noise") {
            config.noise = json_number(v, "noise")?;
        }
        if let Some(v) = field("degree").or_else(|| field("opower")) {
            config.opower = json_integer(v, "degree")?;
        }
        if let Some(v) = field("border_width") {
            config.border_width = json_integer(v, "border_width")?;
        }
        if let Some(v) = field("min_width") {
            config.min_width = json_integer(v, "min_width")?;
        }
        if let Some(v) = field("merge_tolerance") {
            config.merge_tolerance = json_number(v, "merge_tolerance")?;
        }
        if let Some(v) = field("manual") {
            config.manual = json_bool(v, "manual")?;
        }
        if let Some(v) = field("plot") {
            config.plot = json_bool(v, "plot")?;
        }
        Ok(config)
    }
}

/// Load a reduction configuration file and build a [`TraceConfig`] from the
/// object stored under `section` (usually `"orders"`).
pub fn load_settings(path: impl AsRef<Path>, section: &str) -> anyhow::Result<TraceConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    let root: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
    let orders = root
        .get(section)
        .with_context(|| {
            format!(
                "Settings file {} has no \"{}\" section",
                path.display(),
                section
            )
        })?;
    let config = TraceConfig::from_settings(orders)
        .with_context(|| format!("Invalid \"{}\" section in {}", section, path.display()))?;
    info!("Loaded order tracing settings from {}", path.display());
    Ok(config)
}

fn to_usize(value: i64, name: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| TraceError::value_err(format!("{name} = {value} does not fit in usize")))
}

fn json_integer(v: &Value, name: &str) -> Result<i64> {
    v.as_i64().ok_or_else(|| {
        TraceError::type_err(format!("{name} must be an integer, got {}", json_kind(v)))
    })
}

fn json_number(v: &Value, name: &str) -> Result<f64> {
    v.as_f64().ok_or_else(|| {
        TraceError::type_err(format!("{name} must be numeric, got {}", json_kind(v)))
    })
}

fn json_bool(v: &Value, name: &str) -> Result<bool> {
    v.as_bool().ok_or_else(|| {
        TraceError::type_err(format!("{name} must be a boolean, got {}", json_kind(v)))
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config_is_valid() {
        let params = TraceConfig::default().validate().unwrap();
        assert_eq!(params.min_cluster, 500);
        assert_eq!(params.filter_size, 120);
        assert_eq!(params.degree, 4);
        assert_eq!(params.border_width, 5);
        assert!(!params.manual);
        assert_eq!(params.connectivity, Connectivity::Four);
    }

    #[test]
    fn test_value_errors() {
        let cases = [
            TraceConfig {
                filter_size: 0,
                ..Default::default()
            },
            TraceConfig {
                filter_size: -3,
                ..Default::default()
            },
            TraceConfig {
                border_width: -1,
                ..Default::default()
            },
            TraceConfig {
                opower: -1,
                ..Default::default()
            },
            TraceConfig {
                min_width: -1,
                ..Default::default()
            },
            TraceConfig {
                merge_tolerance: -0.5,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(TraceError::Value(_))),
                "expected value error for {config:?}"
            );
        }
    }

    #[test]
    fn test_unrepresentable_degree_is_value_error() {
        let config = TraceConfig {
            opower: i64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TraceError::Value(_))));

        let config = TraceConfig {
            opower: 20,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap().degree, 20);
    }

    #[test]
    fn test_nan_is_type_error() {
        let config = TraceConfig {
            noise: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TraceError::Type(_))));

        let config = TraceConfig {
            merge_tolerance: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TraceError::Type(_))));
    }

    #[test]
    fn test_negative_min_cluster_behaves_as_zero() {
        let config = TraceConfig {
            min_cluster: -10,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap().min_cluster, 0);
    }

    #[test]
    fn test_from_settings_reads_instrument_section() {
        let settings = json!({
            "min_cluster": 2000,
            "filter_size": 60,
            "noise": 100,
            "degree": 2,
            "border_width": 0,
            "manual": true,
            "plot": null,
            "merge_tolerance": 2.5,
            "extra_key": "ignored",
        });
        let config = TraceConfig::from_settings(&settings).unwrap();
        assert_eq!(config.min_cluster, 2000);
        assert_eq!(config.filter_size, 60);
        assert_eq!(config.noise, 100.0);
        assert_eq!(config.opower, 2);
        assert_eq!(config.border_width, 0);
        assert!(config.manual);
        assert!(!config.plot);
        assert_eq!(config.merge_tolerance, 2.5);
    }

    #[test]
    fn test_from_settings_type_errors() {
        let bad = [
            json!({ "min_cluster": "bla" }),
            json!({ "filter_size": "bla" }),
            json!({ "filter_size": 1.5 }),
            json!({ "noise": "bla" }),
            json!({ "border_width": "bla" }),
            json!({ "degree": "bla" }),
            json!({ "opower": 2.5 }),
            json!({ "manual": 1 }),
            json!({ "merge_tolerance": "bla" }),
            json!([1, 2, 3]),
        ];
        for settings in &bad {
            assert!(
                matches!(TraceConfig::from_settings(settings), Err(TraceError::Type(_))),
                "expected type error for {settings}"
            );
        }
    }

    #[test]
    fn test_from_settings_value_errors_surface_on_validate() {
        let config = TraceConfig::from_settings(&json!({ "filter_size": 0 })).unwrap();
        assert!(matches!(config.validate(), Err(TraceError::Value(_))));
    }

    #[test]
    fn test_load_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "orders": { "min_cluster": 100, "degree": 3, "noise": 4.5 } }"#,
        )
        .unwrap();

        let config = load_settings(&path, "orders").unwrap();
        assert_eq!(config.min_cluster, 100);
        assert_eq!(config.opower, 3);
        assert_eq!(config.noise, 4.5);

        assert!(load_settings(&path, "wavecal").is_err());
        assert!(load_settings(dir.path().join("missing.json"), "orders").is_err());
    }
}
