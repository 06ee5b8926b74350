//! Duration encodings used by routing oracles
//!
//! Accepted: a number of seconds (`754`, `754.2`), a seconds string (`"754s"`,
//! `"754"`), or an ISO-8601 duration (`"PT12M34S"`, `"P1DT2H"`). Anything else
//! decodes to zero; callers apply the one-minute floor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDuration {
    Seconds(f64),
    Text(String),
}

impl RawDuration {
    /// Decoded length in seconds, 0 when unrecognized
    #[must_use]
    pub fn seconds(&self) -> f64 {
        let seconds = match self {
            RawDuration::Seconds(s) => *s,
            RawDuration::Text(text) => parse_text(text).unwrap_or(0.0),
        };
        if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.0
        }
    }

    /// Whole minutes, rounded up
    #[must_use]
    pub fn minutes(&self) -> u32 {
        seconds_to_minutes(self.seconds())
    }
}

impl From<f64> for RawDuration {
    fn from(seconds: f64) -> Self {
        RawDuration::Seconds(seconds)
    }
}

#[must_use]
pub fn seconds_to_minutes(seconds: f64) -> u32 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    let minutes = (seconds / 60.0).ceil();
    if minutes >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        minutes as u32
    }
}

fn parse_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Some(iso) = text.strip_prefix('P').or_else(|| text.strip_prefix('p')) {
        return parse_iso8601(iso);
    }
    let number = text.strip_suffix('s').unwrap_or(text);
    number.trim().parse::<f64>().ok()
}

/// Parses the part after the leading `P`. Years and months are rejected since
/// their length in seconds is not fixed.
fn parse_iso8601(body: &str) -> Option<f64> {
    let (date_part, time_part) = match body.split_once(['T', 't']) {
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };

    let mut total = 0.0;
    let mut components = 0;

    for (value, unit) in components_of(date_part)? {
        total += value
            * match unit {
                'W' => 7.0 * 86_400.0,
                'D' => 86_400.0,
                _ => return None,
            };
        components += 1;
    }

    if let Some(time_part) = time_part {
        if time_part.is_empty() {
            return None;
        }
        for (value, unit) in components_of(time_part)? {
            total += value
                * match unit {
                    'H' => 3_600.0,
                    'M' => 60.0,
                    'S' => 1.0,
                    _ => return None,
                };
            components += 1;
        }
    }

    (components > 0).then_some(total)
}

/// Splits `"1H30M"` into `[(1.0, 'H'), (30.0, 'M')]`
fn components_of(part: &str) -> Option<Vec<(f64, char)>> {
    let mut components = Vec::new();
    let mut number = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
        } else {
            let value = number.parse::<f64>().ok()?;
            components.push((value, c.to_ascii_uppercase()));
            number.clear();
        }
    }

    // trailing digits without a unit
    number.is_empty().then_some(components)
}
