use gridsim_core::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::warn;

/// Time constant substituted when a configured one is zero.
pub const FALLBACK_TIME_CONSTANT: f64 = 0.01;

/// Synchronous machine parameters in per-unit on machine base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenParams {
    /// Inertia constant (s)
    pub h: f64,
    /// Damping
    pub d: f64,
    /// Stator resistance
    pub rs: f64,
    pub xd: f64,
    pub xq: f64,
    pub xdp: f64,
    pub xqp: f64,
    pub xdpp: f64,
    pub xqpp: f64,
    /// d-axis open-circuit transient time constant (s)
    pub tdop: f64,
    pub tqop: f64,
    /// d-axis open-circuit subtransient time constant (s)
    pub tdopp: f64,
    pub tqopp: f64,
    /// Base angular frequency (rad/s)
    pub base_freq: f64,
}

impl Default for GenParams {
    fn default() -> Self {
        GenParams {
            h: 5.0,
            d: 0.04,
            rs: 0.0,
            xd: 1.05,
            xq: 0.7,
            xdp: 0.35,
            xqp: 0.5,
            xdpp: 0.25,
            xqpp: 0.25,
            tdop: 8.0,
            tqop: 1.0,
            tdopp: 0.035,
            tqopp: 0.05,
            base_freq: 2.0 * PI * 60.0,
        }
    }
}

impl GenParams {
    /// Set a parameter by (case-insensitive) name.
    pub fn set(&mut self, name: &str, value: f64) -> GridResult<()> {
        let slot = match name.to_ascii_lowercase().as_str() {
            "h" | "inertia" => &mut self.h,
            "d" | "damping" => &mut self.d,
            "rs" | "r" => &mut self.rs,
            "xd" => &mut self.xd,
            "xq" => &mut self.xq,
            "xdp" | "xd'" => &mut self.xdp,
            "xqp" | "xq'" => &mut self.xqp,
            "xdpp" | "xd''" => &mut self.xdpp,
            "xqpp" | "xq''" => &mut self.xqpp,
            "tdop" | "td0p" => &mut self.tdop,
            "tqop" | "tq0p" => &mut self.tqop,
            "tdopp" | "td0pp" => &mut self.tdopp,
            "tqopp" | "tq0pp" => &mut self.tqopp,
            "basefreq" | "base_freq" | "omegab" => &mut self.base_freq,
            other => {
                return Err(GridError::Parameter(format!(
                    "unknown generator parameter '{}'",
                    other
                )))
            }
        };
        *slot = value;
        Ok(())
    }

    /// Reject values no machine model can integrate.
    pub fn validate(&self) -> GridResult<()> {
        if self.h <= 0.0 {
            return Err(GridError::Parameter(format!(
                "inertia constant must be positive, got {}",
                self.h
            )));
        }
        if self.base_freq <= 0.0 {
            return Err(GridError::Parameter(format!(
                "base frequency must be positive, got {}",
                self.base_freq
            )));
        }
        let reactances = [self.xd, self.xq, self.xdp, self.xqp, self.xdpp, self.xqpp];
        if reactances.iter().any(|x| *x < 0.0) || self.rs < 0.0 {
            return Err(GridError::Parameter(
                "stator resistance and reactances must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Replace zero time constants with [`FALLBACK_TIME_CONSTANT`].
    pub fn apply_fallbacks(&mut self, component: &str) {
        for (label, value) in [
            ("tdop", &mut self.tdop),
            ("tqop", &mut self.tqop),
            ("tdopp", &mut self.tdopp),
            ("tqopp", &mut self.tqopp),
        ] {
            if *value == 0.0 {
                warn!(
                    component,
                    parameter = label,
                    fallback = FALLBACK_TIME_CONSTANT,
                    "zero time constant replaced"
                );
                *value = FALLBACK_TIME_CONSTANT;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_case_insensitive_and_rejects_unknown_names() {
        let mut params = GenParams::default();
        params.set("H", 3.2).unwrap();
        params.set("Xd''", 0.2).unwrap();
        assert_eq!(params.h, 3.2);
        assert_eq!(params.xdpp, 0.2);
        assert!(matches!(params.set("kv", 1.0), Err(GridError::Parameter(_))));
    }

    #[test]
    fn zero_time_constants_fall_back() {
        let mut params = GenParams {
            tqop: 0.0,
            tdop: 0.0,
            ..GenParams::default()
        };
        params.apply_fallbacks("G1");
        assert_eq!(params.tqop, FALLBACK_TIME_CONSTANT);
        assert_eq!(params.tdop, FALLBACK_TIME_CONSTANT);
        assert_eq!(params.tdopp, 0.035);
    }

    #[test]
    fn validate_rejects_non_positive_inertia() {
        let params = GenParams {
            h: 0.0,
            ..GenParams::default()
        };
        assert!(params.validate().is_err());
        assert!(GenParams::default().validate().is_ok());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let params: GenParams = serde_json::from_str(r#"{"h": 2.5}"#).unwrap();
        assert_eq!(params.h, 2.5);
        assert_eq!(params.xd, 1.05);
    }
}
