use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map, Value};
use thiserror::Error;

pub const DEFAULT_IMAGE_PROMPT: &str = "A cybernetic owl reading in a neon library, cinematic, 4K";
pub const GUIDANCE_SCALE: f64 = 7.5;
pub const NEGATIVE_PROMPT: &str = "blurry, distorted, ugly";
pub const REFINER: &str = "expert_ensemble_refiner";
pub const HIGH_NOISE_FRAC: f64 = 0.8;

const DIMENSION_MIN: u32 = 256;
const DIMENSION_MAX: u32 = 2048;
const DIMENSION_STEP: u32 = 64;
const COUNT_MAX: u32 = 4;
const STEPS_MAX: u32 = 150;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("{field} {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },
    #[error("{field} {value} is not a multiple of {step}")]
    NotMultiple {
        field: &'static str,
        value: u32,
        step: u32,
    },
    #[error("unknown scheduler '{0}' (expected K_EULER, DPMSolverMultistep or DDIM)")]
    UnknownScheduler(String),
    #[error("invalid {field} value '{raw}'")]
    InvalidValue { field: &'static str, raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduler {
    #[default]
    KEuler,
    DpmSolverMultistep,
    Ddim,
}

impl Scheduler {
    pub const ALL: [Scheduler; 3] = [Self::KEuler, Self::DpmSolverMultistep, Self::Ddim];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KEuler => "K_EULER",
            Self::DpmSolverMultistep => "DPMSolverMultistep",
            Self::Ddim => "DDIM",
        }
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheduler {
    type Err = RequestError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|scheduler| scheduler.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| RequestError::UnknownScheduler(trimmed.to_string()))
    }
}

/// Parameters for one text-to-image job.
///
/// Fields are public so a front end can tweak them, but nothing should be
/// submitted without a passing [`GenerationRequest::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub num_outputs: u32,
    pub scheduler: Scheduler,
    pub steps: u32,
    pub strength: f64,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_PROMPT)
    }
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: 1024,
            height: 1024,
            num_outputs: 1,
            scheduler: Scheduler::KEuler,
            steps: 50,
            strength: 0.8,
        }
    }

    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.prompt.trim().is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        check_dimension("width", self.width)?;
        check_dimension("height", self.height)?;
        check_range("num_outputs", self.num_outputs, 1, COUNT_MAX)?;
        check_range("steps", self.steps, 1, STEPS_MAX)?;
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(RequestError::OutOfRange {
                field: "strength",
                value: self.strength.to_string(),
                min: "0.0".to_string(),
                max: "1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Applies one named setting from its text form. The request is left
    /// untouched when the value doesn't parse or falls outside its range.
    pub fn apply_setting(&mut self, name: &str, raw: &str) -> Result<(), RequestError> {
        let mut next = self.clone();
        match name {
            "size" => {
                let (width, height) =
                    parse_size(raw).ok_or_else(|| RequestError::InvalidValue {
                        field: "size",
                        raw: raw.to_string(),
                    })?;
                next.width = width;
                next.height = height;
            }
            "width" => next.width = parse_number("width", raw)?,
            "height" => next.height = parse_number("height", raw)?,
            "count" | "num_outputs" => next.num_outputs = parse_number("num_outputs", raw)?,
            "steps" => next.steps = parse_number("steps", raw)?,
            "strength" => next.strength = parse_number("strength", raw)?,
            "scheduler" => next.scheduler = raw.parse()?,
            _ => {
                return Err(RequestError::InvalidValue {
                    field: "setting",
                    raw: name.to_string(),
                })
            }
        }
        if next.prompt.trim().is_empty() {
            next.prompt = DEFAULT_IMAGE_PROMPT.to_string();
        }
        next.validate()?;
        next.prompt = self.prompt.clone();
        *self = next;
        Ok(())
    }

    /// Provider input with the fixed refinement defaults merged in.
    pub fn provider_input(&self) -> Map<String, Value> {
        let value = json!({
            "prompt": self.prompt,
            "width": self.width,
            "height": self.height,
            "num_outputs": self.num_outputs,
            "scheduler": self.scheduler.as_str(),
            "num_inference_steps": self.steps,
            "guidance_scale": GUIDANCE_SCALE,
            "prompt_strength": self.strength,
            "negative_prompt": NEGATIVE_PROMPT,
            "refine": REFINER,
            "high_noise_frac": HIGH_NOISE_FRAC,
        });
        value.as_object().cloned().unwrap_or_default()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}x{}, {} image(s), {}, {} steps, strength {}",
            self.width, self.height, self.num_outputs, self.scheduler, self.steps, self.strength
        )
    }
}

fn check_dimension(field: &'static str, value: u32) -> Result<(), RequestError> {
    check_range(field, value, DIMENSION_MIN, DIMENSION_MAX)?;
    if value % DIMENSION_STEP != 0 {
        return Err(RequestError::NotMultiple {
            field,
            value,
            step: DIMENSION_STEP,
        });
    }
    Ok(())
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), RequestError> {
    if value < min || value > max {
        return Err(RequestError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}

fn parse_number<T: FromStr>(field: &'static str, raw: &str) -> Result<T, RequestError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| RequestError::InvalidValue {
            field,
            raw: raw.to_string(),
        })
}

fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let normalized = raw.trim().to_ascii_lowercase();
    let (left, right) = normalized.split_once('x')?;
    let width = left.trim().parse::<u32>().ok()?;
    let height = right.trim().parse::<u32>().ok()?;
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{GenerationRequest, RequestError, Scheduler};

    #[test]
    fn default_request_is_valid() {
        assert_eq!(GenerationRequest::default().validate(), Ok(()));
    }

    #[test]
    fn out_of_range_fields_are_rejected_not_clamped() {
        let base = GenerationRequest::new("owl");
        let cases = [
            GenerationRequest {
                width: 128,
                ..base.clone()
            },
            GenerationRequest {
                height: 4096,
                ..base.clone()
            },
            GenerationRequest {
                num_outputs: 0,
                ..base.clone()
            },
            GenerationRequest {
                num_outputs: 5,
                ..base.clone()
            },
            GenerationRequest {
                steps: 0,
                ..base.clone()
            },
            GenerationRequest {
                steps: 151,
                ..base.clone()
            },
            GenerationRequest {
                strength: 1.5,
                ..base.clone()
            },
            GenerationRequest {
                strength: f64::NAN,
                ..base.clone()
            },
        ];
        for request in cases {
            let snapshot = request.clone();
            assert!(
                matches!(request.validate(), Err(RequestError::OutOfRange { .. })),
                "{request:?} should be rejected"
            );
            assert_eq!(request.width, snapshot.width);
        }
    }

    #[test]
    fn dimensions_must_follow_step() {
        let request = GenerationRequest {
            width: 1000,
            ..GenerationRequest::new("owl")
        };
        assert_eq!(
            request.validate(),
            Err(RequestError::NotMultiple {
                field: "width",
                value: 1000,
                step: 64
            })
        );
    }

    #[test]
    fn empty_prompt_is_rejected() {
        assert_eq!(
            GenerationRequest::new("  ").validate(),
            Err(RequestError::EmptyPrompt)
        );
    }

    #[test]
    fn scheduler_parses_case_insensitively() -> anyhow::Result<()> {
        assert_eq!("ddim".parse::<Scheduler>()?, Scheduler::Ddim);
        assert_eq!(
            "DPMSolverMultistep".parse::<Scheduler>()?,
            Scheduler::DpmSolverMultistep
        );
        assert!("euler_a".parse::<Scheduler>().is_err());
        Ok(())
    }

    #[test]
    fn apply_setting_keeps_request_on_invalid_value() -> anyhow::Result<()> {
        let mut request = GenerationRequest::new("owl");
        request.apply_setting("size", "768x512")?;
        assert_eq!((request.width, request.height), (768, 512));

        assert!(request.apply_setting("count", "9").is_err());
        assert!(request.apply_setting("size", "big").is_err());
        assert!(request.apply_setting("strength", "-0.1").is_err());
        assert_eq!(request.num_outputs, 1);
        assert_eq!((request.width, request.height), (768, 512));

        request.apply_setting("scheduler", "DDIM")?;
        assert_eq!(request.scheduler, Scheduler::Ddim);
        Ok(())
    }

    #[test]
    fn provider_input_merges_fixed_defaults() {
        let input = GenerationRequest::new("owl").provider_input();
        assert_eq!(input["prompt"], json!("owl"));
        assert_eq!(input["num_inference_steps"], json!(50));
        assert_eq!(input["scheduler"], json!("K_EULER"));
        assert_eq!(input["guidance_scale"], json!(7.5));
        assert_eq!(input["negative_prompt"], json!("blurry, distorted, ugly"));
        assert_eq!(input["refine"], json!("expert_ensemble_refiner"));
        assert_eq!(input["high_noise_frac"], json!(0.8));
        assert_eq!(input["prompt_strength"], json!(0.8));
    }
}
