//! Watermark options: user-facing partial configuration and its resolution
//! into a fully populated [`ResolvedConfig`].
//!
//! Resolution never fails. Malformed numeric fields degrade to their
//! defaults, the same way a browser would quietly ignore a bad CSS value.

use serde::{Deserialize, Deserializer, Serialize};

/// Rotation applied when none is configured, in degrees
pub const DEFAULT_ROTATE: f64 = -20.0;
/// Stacking order of the overlay surface
pub const DEFAULT_Z_INDEX: i32 = 1;
/// Spacing between tiles on either axis
pub const DEFAULT_GAP: f64 = 100.0;
/// Tile width used for image watermarks without an explicit width
pub const DEFAULT_IMAGE_WIDTH: f64 = 100.0;

/// A field that accepts either a JSON number or a string such as `"16px"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberLike {
    Number(f64),
    Text(String),
}

impl From<f64> for NumberLike {
    fn from(v: f64) -> Self {
        NumberLike::Number(v)
    }
}

impl From<i32> for NumberLike {
    fn from(v: i32) -> Self {
        NumberLike::Number(f64::from(v))
    }
}

impl From<&str> for NumberLike {
    fn from(v: &str) -> Self {
        NumberLike::Text(v.to_string())
    }
}

impl From<String> for NumberLike {
    fn from(v: String) -> Self {
        NumberLike::Text(v)
    }
}

impl std::fmt::Display for NumberLike {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberLike::Number(n) => write!(f, "{}", n),
            NumberLike::Text(s) => f.write_str(s),
        }
    }
}

/// Outcome of coercing a [`NumberLike`] to a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced {
    Parsed(f64),
    Fallback,
}

impl Coerced {
    /// Parsed value, or `default` when coercion fell back.
    pub fn or(self, default: f64) -> f64 {
        match self {
            Coerced::Parsed(v) => v,
            Coerced::Fallback => default,
        }
    }

    pub fn parsed(self) -> Option<f64> {
        match self {
            Coerced::Parsed(v) => Some(v),
            Coerced::Fallback => None,
        }
    }

    /// Keep the parsed value only if it satisfies `pred`.
    pub fn filter(self, pred: impl FnOnce(f64) -> bool) -> Coerced {
        match self {
            Coerced::Parsed(v) if pred(v) => Coerced::Parsed(v),
            _ => Coerced::Fallback,
        }
    }
}

/// Coerce an optional number-or-string to a finite number.
///
/// Strings are read with float-prefix semantics, so `"16px"` yields 16 and
/// `"abc"` falls back. Values are drawn in `f32`, so anything that
/// overflows it (`"1e39px"`) falls back as well.
pub fn coerce(value: Option<&NumberLike>) -> Coerced {
    let parsed = match value {
        None => None,
        Some(NumberLike::Number(n)) => Some(*n),
        Some(NumberLike::Text(s)) => parse_float_prefix(s),
    };
    match parsed {
        Some(v) if fits_f32(v) => Coerced::Parsed(v),
        _ => Coerced::Fallback,
    }
}

fn fits_f32(v: f64) -> bool {
    v.is_finite() && (v as f32).is_finite()
}

/// Parse the longest leading decimal number of `s` (after leading
/// whitespace). Accepts an optional sign, fraction and exponent.
pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start || digits > 0 {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }
    // exponent only counts when followed by at least one digit
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok()
}

/// Font settings as supplied by the user; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FontStyleConfig {
    pub font_size: Option<NumberLike>,
    pub color: Option<String>,
    pub font_family: Option<String>,
    pub font_weight: Option<NumberLike>,
}

impl FontStyleConfig {
    fn merge(&mut self, patch: FontStyleConfig) {
        if patch.font_size.is_some() {
            self.font_size = patch.font_size;
        }
        if patch.color.is_some() {
            self.color = patch.color;
        }
        if patch.font_family.is_some() {
            self.font_family = patch.font_family;
        }
        if patch.font_weight.is_some() {
            self.font_weight = patch.font_weight;
        }
    }
}

/// Fully resolved font settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FontStyle {
    pub font_size: NumberLike,
    pub color: String,
    pub font_family: String,
    pub font_weight: NumberLike,
}

impl Default for FontStyle {
    fn default() -> Self {
        Self {
            font_size: NumberLike::Text("16px".to_string()),
            color: "rgba(0,0,0,0.15)".to_string(),
            font_family: "sans-serif".to_string(),
            font_weight: NumberLike::Text("normal".to_string()),
        }
    }
}

/// Partial watermark configuration as supplied by a host.
///
/// The container is not part of this struct: it is passed explicitly when
/// the engine is mounted.
///
/// # Examples
///
/// ```
/// let cfg: rfwatermark::WatermarkConfig =
///     serde_json::from_str(r#"{"content": "Confidential", "gap": [40]}"#).unwrap();
/// let resolved = rfwatermark::options::resolve(&cfg);
/// assert_eq!(resolved.gap, [40.0, 40.0]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkConfig {
    /// Text lines, top to bottom. A single string is accepted as one line.
    #[serde(deserialize_with = "deserialize_lines")]
    pub content: Option<Vec<String>>,
    /// Image reference (URL, `data:` URL or path). Takes precedence over text.
    pub image: Option<String>,
    pub width: Option<NumberLike>,
    pub height: Option<NumberLike>,
    /// Rotation in degrees
    pub rotate: Option<f64>,
    pub gap: Option<Vec<NumberLike>>,
    pub offset: Option<Vec<NumberLike>>,
    pub font_style: Option<FontStyleConfig>,
    pub z_index: Option<i32>,
}

fn deserialize_lines<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lines {
        One(String),
        Many(Vec<String>),
    }

    Ok(Option::<Lines>::deserialize(deserializer)?.map(|l| match l {
        Lines::One(s) => vec![s],
        Lines::Many(v) => v,
    }))
}

impl WatermarkConfig {
    /// Text-only configuration with the given lines.
    pub fn text<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            content: Some(lines.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Deep-merge `patch` over `self`.
    ///
    /// `fontStyle` merges field by field; sequences (`content`, `gap`,
    /// `offset`) are replaced wholesale.
    pub fn merge(&mut self, patch: WatermarkConfig) {
        let WatermarkConfig {
            content,
            image,
            width,
            height,
            rotate,
            gap,
            offset,
            font_style,
            z_index,
        } = patch;

        if content.is_some() {
            self.content = content;
        }
        if image.is_some() {
            self.image = image;
        }
        if width.is_some() {
            self.width = width;
        }
        if height.is_some() {
            self.height = height;
        }
        if rotate.is_some() {
            self.rotate = rotate;
        }
        if gap.is_some() {
            self.gap = gap;
        }
        if offset.is_some() {
            self.offset = offset;
        }
        if let Some(fs) = font_style {
            self.font_style.get_or_insert_with(Default::default).merge(fs);
        }
        if z_index.is_some() {
            self.z_index = z_index;
        }
    }
}

/// A configuration with every field settled.
///
/// `width`/`height` stay `None` when they are to be derived from the
/// rendered content (text measurement or image aspect ratio).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub content: Vec<String>,
    pub image: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotate: f64,
    pub z_index: i32,
    pub gap: [f64; 2],
    pub offset: [f64; 2],
    pub font_style: FontStyle,
    #[serde(skip)]
    explicit_width: Option<f64>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        resolve(&WatermarkConfig::default())
    }
}

impl ResolvedConfig {
    /// The configuration the text path renders when an image fails to
    /// load: identical to resolving the same input without `image`.
    pub fn without_image(&self) -> ResolvedConfig {
        ResolvedConfig {
            image: None,
            width: self.explicit_width,
            ..self.clone()
        }
    }
}

/// Merge a partial configuration with the defaults.
pub fn resolve(partial: &WatermarkConfig) -> ResolvedConfig {
    let font_style = {
        let d = FontStyle::default();
        match partial.font_style.clone() {
            None => d,
            Some(fs) => FontStyle {
                font_size: fs.font_size.unwrap_or(d.font_size),
                color: fs.color.unwrap_or(d.color),
                font_family: fs.font_family.unwrap_or(d.font_family),
                font_weight: fs.font_weight.unwrap_or(d.font_weight),
            },
        }
    };

    let explicit_width = coerce(partial.width.as_ref()).filter(|v| v > 0.0).parsed();
    let width = match (explicit_width, &partial.image) {
        (None, Some(_)) => Some(DEFAULT_IMAGE_WIDTH),
        (w, _) => w,
    };
    let height = coerce(partial.height.as_ref()).filter(|v| v > 0.0).parsed();

    let gap = partial.gap.as_deref().unwrap_or_default();
    let g0 = coerce(gap.first()).filter(|v| v >= 0.0).or(DEFAULT_GAP);
    let g1 = coerce(gap.get(1)).filter(|v| v >= 0.0).or(g0);

    let offset = partial.offset.as_deref().unwrap_or_default();
    let o0 = coerce(offset.first()).or(0.0);
    let o1 = coerce(offset.get(1)).or(o0);

    let rotate = partial
        .rotate
        .filter(|r| fits_f32(*r))
        .unwrap_or(DEFAULT_ROTATE);

    ResolvedConfig {
        content: partial.content.clone().unwrap_or_default(),
        image: partial.image.clone().filter(|s| !s.trim().is_empty()),
        width,
        height,
        rotate,
        z_index: partial.z_index.unwrap_or(DEFAULT_Z_INDEX),
        gap: [g0, g1],
        offset: [o0, o1],
        font_style,
        explicit_width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_empty_yields_documented_defaults() {
        let r = resolve(&WatermarkConfig::default());
        assert_eq!(r.rotate, -20.0);
        assert_eq!(r.z_index, 1);
        assert_eq!(r.gap, [100.0, 100.0]);
        assert_eq!(r.offset, [0.0, 0.0]);
        assert_eq!(r.font_style, FontStyle::default());
        assert_eq!(r.font_style.color, "rgba(0,0,0,0.15)");
        assert!(r.content.is_empty());
        assert_eq!(r.width, None);
        assert_eq!(r.height, None);
    }

    #[test]
    fn gap_and_offset_are_symmetric_when_only_x_given() {
        let r = resolve(&WatermarkConfig {
            gap: Some(vec![50.into()]),
            offset: Some(vec!["12px".into()]),
            ..Default::default()
        });
        assert_eq!(r.gap, [50.0, 50.0]);
        assert_eq!(r.offset, [12.0, 12.0]);

        let r = resolve(&WatermarkConfig {
            gap: Some(vec![50.into(), 20.into()]),
            ..Default::default()
        });
        assert_eq!(r.gap, [50.0, 20.0]);
    }

    #[test]
    fn malformed_numbers_degrade_to_defaults() {
        let r = resolve(&WatermarkConfig {
            width: Some("wide".into()),
            height: Some(f64::NAN.into()),
            gap: Some(vec!["x".into(), (-5).into()]),
            rotate: Some(f64::INFINITY),
            ..Default::default()
        });
        assert_eq!(r.width, None);
        assert_eq!(r.height, None);
        assert_eq!(r.gap, [100.0, 100.0]);
        assert_eq!(r.rotate, -20.0);
    }

    #[test]
    fn values_overflowing_f32_degrade_to_defaults() {
        let r = resolve(&WatermarkConfig {
            width: Some("1e39".into()),
            gap: Some(vec![1e300.into()]),
            rotate: Some(1e39),
            ..Default::default()
        });
        assert_eq!(r.width, None);
        assert_eq!(r.gap, [100.0, 100.0]);
        assert_eq!(r.rotate, -20.0);
        assert_eq!(coerce(Some(&"1e39px".into())), Coerced::Fallback);
        assert_eq!(coerce(Some(&"3e38px".into())), Coerced::Parsed(3e38));
    }

    #[test]
    fn zero_rotation_and_zero_gap_are_honored() {
        let r = resolve(&WatermarkConfig {
            rotate: Some(0.0),
            gap: Some(vec![0.into()]),
            ..Default::default()
        });
        assert_eq!(r.rotate, 0.0);
        assert_eq!(r.gap, [0.0, 0.0]);
    }

    #[test]
    fn image_gets_default_width_only_when_unset() {
        let r = resolve(&WatermarkConfig {
            image: Some("logo.png".into()),
            ..Default::default()
        });
        assert_eq!(r.width, Some(DEFAULT_IMAGE_WIDTH));
        assert_eq!(r.without_image().width, None);

        let r = resolve(&WatermarkConfig {
            image: Some("logo.png".into()),
            width: Some("64".into()),
            ..Default::default()
        });
        assert_eq!(r.width, Some(64.0));
        assert_eq!(r.without_image().width, Some(64.0));
    }

    #[test]
    fn font_style_merges_field_by_field() {
        let mut cfg = WatermarkConfig {
            font_style: Some(FontStyleConfig {
                font_size: Some("24px".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        cfg.merge(WatermarkConfig {
            font_style: Some(FontStyleConfig {
                color: Some("red".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let r = resolve(&cfg);
        assert_eq!(r.font_style.color, "red");
        assert_eq!(r.font_style.font_size, NumberLike::from("24px"));
        assert_eq!(r.font_style.font_family, "sans-serif");
        assert_eq!(r.font_style.font_weight, NumberLike::from("normal"));
    }

    #[test]
    fn merge_replaces_sequences_wholesale() {
        let mut cfg = WatermarkConfig {
            content: Some(vec!["a".into(), "b".into()]),
            gap: Some(vec![10.into(), 20.into()]),
            ..Default::default()
        };
        cfg.merge(WatermarkConfig {
            content: Some(vec!["c".into()]),
            gap: Some(vec![5.into()]),
            ..Default::default()
        });
        assert_eq!(cfg.content, Some(vec!["c".to_string()]));
        assert_eq!(resolve(&cfg).gap, [5.0, 5.0]);
    }

    #[test]
    fn float_prefix_parsing() {
        assert_eq!(parse_float_prefix("16px"), Some(16.0));
        assert_eq!(parse_float_prefix("  -2.5e1rem"), Some(-25.0));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("3e"), Some(3.0));
        assert_eq!(parse_float_prefix("px16"), None);
        assert_eq!(parse_float_prefix("-"), None);
        assert_eq!(parse_float_prefix(""), None);
    }

    #[test]
    fn deserializes_camel_case_json() {
        let cfg: WatermarkConfig = serde_json::from_str(
            r#"{"content":["a","b"],"zIndex":9,"width":"120","fontStyle":{"fontSize":20,"fontWeight":700}}"#,
        )
        .unwrap();
        let r = resolve(&cfg);
        assert_eq!(r.content, vec!["a", "b"]);
        assert_eq!(r.z_index, 9);
        assert_eq!(r.width, Some(120.0));
        assert_eq!(r.font_style.font_size, NumberLike::Number(20.0));
        assert_eq!(r.font_style.font_weight, NumberLike::Number(700.0));
    }
}
