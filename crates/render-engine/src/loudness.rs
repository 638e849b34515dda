//! Loudness pre-pass: arguments for the measurement run and parsing of
//! the statistics block it prints.

use std::collections::HashMap;
use std::path::Path;

use mixdown_common::error::{MixError, MixResult};
use mixdown_project_model::track::LoudnessMeasurement;

/// Fixed normalization targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessTargets {
    /// Integrated loudness (LUFS).
    pub integrated: f64,
    /// True-peak ceiling (dBTP).
    pub true_peak: f64,
    /// Loudness range (LU).
    pub lra: f64,
}

impl Default for LoudnessTargets {
    fn default() -> Self {
        Self {
            integrated: -14.0,
            true_peak: -1.0,
            lra: 11.0,
        }
    }
}

impl LoudnessTargets {
    /// `I=..:TP=..:LRA=..` as used by both passes.
    pub fn filter_args(&self) -> String {
        format!(
            "I={}:TP={}:LRA={}",
            self.integrated, self.true_peak, self.lra
        )
    }
}

/// Engine arguments for a measurement-only run over one source.
pub fn loudness_pass_args(source: &Path, targets: &LoudnessTargets) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-af".to_string(),
        format!("loudnorm={}:print_format=json", targets.filter_args()),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ]
}

/// Extract the four input-side measurements from pre-pass output.
///
/// Only the last balanced top-level `{...}` block is considered; the
/// engine may print brace pairs earlier in the stream.
pub fn parse_loudnorm_output(text: &str) -> MixResult<LoudnessMeasurement> {
    let block = last_json_block(text)
        .ok_or_else(|| MixError::analysis("no loudness statistics block in engine output"))?;

    let fields: HashMap<String, serde_json::Value> = serde_json::from_str(block)
        .map_err(|e| MixError::analysis(format!("malformed loudness statistics: {e}")))?;

    Ok(LoudnessMeasurement {
        integrated_lufs: field(&fields, "input_i")?,
        true_peak_dbtp: field(&fields, "input_tp")?,
        lra_lu: field(&fields, "input_lra")?,
        threshold_lufs: field(&fields, "input_thresh")?,
    })
}

fn field(fields: &HashMap<String, serde_json::Value>, key: &str) -> MixResult<f64> {
    let value = fields
        .get(key)
        .ok_or_else(|| MixError::analysis(format!("loudness statistics missing '{key}'")))?;

    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| MixError::analysis(format!("unparsable loudness value {key}={value}")))
}

/// Byte range of the last balanced top-level brace block.
fn last_json_block(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut open_at = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut last = None;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    open_at = idx;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    last = Some(&text[open_at..=idx]);
                }
            }
            _ => {}
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREPASS: &str = r#"
[Parsed_loudnorm_0 @ 0x55d5c8a0] {noise} stray braces {here}
Input #0, wav, from 'a.wav':
  Duration: 00:03:20.00, bitrate: 1411 kb/s
[Parsed_loudnorm_0 @ 0x55d5c8a0]
{
	"input_i" : "-23.54",
	"input_tp" : "-4.12",
	"input_lra" : "7.30",
	"input_thresh" : "-34.01",
	"output_i" : "-14.02",
	"output_tp" : "-1.00",
	"output_lra" : "6.10",
	"output_thresh" : "-24.40",
	"normalization_type" : "dynamic",
	"target_offset" : "0.02"
}
"#;

    #[test]
    fn test_parses_last_block() {
        let m = parse_loudnorm_output(PREPASS).unwrap();
        assert_eq!(m.integrated_lufs, -23.54);
        assert_eq!(m.true_peak_dbtp, -4.12);
        assert_eq!(m.lra_lu, 7.30);
        assert_eq!(m.threshold_lufs, -34.01);
    }

    #[test]
    fn test_numeric_values_accepted() {
        let text = r#"{"input_i": -20.0, "input_tp": -2, "input_lra": 5.5, "input_thresh": "-30"}"#;
        let m = parse_loudnorm_output(text).unwrap();
        assert_eq!(m.integrated_lufs, -20.0);
        assert_eq!(m.true_peak_dbtp, -2.0);
        assert_eq!(m.threshold_lufs, -30.0);
    }

    #[test]
    fn test_missing_block_is_analysis_error() {
        let err = parse_loudnorm_output("Input #0, wav\nno statistics").unwrap_err();
        assert!(matches!(err, MixError::Analysis { .. }));
    }

    #[test]
    fn test_missing_key_is_analysis_error() {
        let err = parse_loudnorm_output(r#"{"input_i": "-20", "input_tp": "-1"}"#).unwrap_err();
        assert!(err.to_string().contains("input_lra"));
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let text = r#"{"input_i": "-inf", "input_tp": "-1", "input_lra": "0", "input_thresh": "-70"}"#;
        assert!(matches!(
            parse_loudnorm_output(text),
            Err(MixError::Analysis { .. })
        ));
    }

    #[test]
    fn test_pass_args_shape() {
        let args = loudness_pass_args(Path::new("/music/a.wav"), &LoudnessTargets::default());
        assert_eq!(args[3], "/music/a.wav");
        assert_eq!(args[5], "loudnorm=I=-14:TP=-1:LRA=11:print_format=json");
        assert_eq!(&args[6..], ["-f", "null", "-"]);
    }
}
