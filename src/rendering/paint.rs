/// Paint settings shared by the text and image paths: CSS colors and the
/// font description handed to a text engine.

use crate::options::{coerce, FontStyle, NumberLike};
use tiny_skia::Color;

/// Size the 2D canvas falls back to when a font size cannot be understood.
pub const CANVAS_DEFAULT_FONT_SIZE: f32 = 10.0;

/// Generic or named font family
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FontFamily {
    SansSerif,
    Serif,
    Monospace,
    Cursive,
    Fantasy,
    Named(String),
}

impl FontFamily {
    /// Parse a CSS `font-family` list, keeping only the first entry.
    pub fn parse(list: &str) -> Self {
        let first = list
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches(|c| c == '"' || c == '\'');
        match first.to_ascii_lowercase().as_str() {
            "" | "sans-serif" | "system-ui" => FontFamily::SansSerif,
            "serif" => FontFamily::Serif,
            "monospace" => FontFamily::Monospace,
            "cursive" => FontFamily::Cursive,
            "fantasy" => FontFamily::Fantasy,
            _ => FontFamily::Named(first.to_string()),
        }
    }
}

/// Resolved font used for measuring and drawing
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    /// Size in logical pixels
    pub size: f32,
    /// CSS weight, 1..=1000
    pub weight: u16,
    pub family: FontFamily,
}

impl Default for FontSpec {
    fn default() -> Self {
        FontSpec::from_style(&FontStyle::default())
    }
}

impl FontSpec {
    pub fn from_style(style: &FontStyle) -> Self {
        FontSpec {
            size: font_size_px(&style.font_size),
            weight: font_weight(&style.font_weight),
            family: FontFamily::parse(&style.font_family),
        }
    }

    /// Same font scaled for a physical raster
    pub fn scaled(&self, scale: f32) -> Self {
        FontSpec {
            size: self.size * scale,
            ..self.clone()
        }
    }
}

/// Font size in pixels. Unit-suffixed strings use their numeric prefix;
/// anything else is taken verbatim as an absolute-size keyword.
pub fn font_size_px(size: &NumberLike) -> f32 {
    if let Some(px) = coerce(Some(size)).filter(|v| v > 0.0).parsed() {
        return px as f32;
    }
    let keyword = match size {
        NumberLike::Text(s) => s.trim().to_ascii_lowercase(),
        NumberLike::Number(_) => return CANVAS_DEFAULT_FONT_SIZE,
    };
    match keyword.as_str() {
        "xx-small" => 9.0,
        "x-small" => 10.0,
        "small" => 13.0,
        "medium" => 16.0,
        "large" => 18.0,
        "x-large" => 24.0,
        "xx-large" => 32.0,
        "xxx-large" => 48.0,
        _ => CANVAS_DEFAULT_FONT_SIZE,
    }
}

pub fn font_weight(weight: &NumberLike) -> u16 {
    match weight {
        NumberLike::Number(n) if n.is_finite() => n.clamp(1.0, 1000.0) as u16,
        NumberLike::Number(_) => 400,
        NumberLike::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "bold" | "bolder" => 700,
            "lighter" => 300,
            other => other
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(|n| n.clamp(1.0, 1000.0) as u16)
                .unwrap_or(400),
        },
    }
}

/// Parse a CSS color: hex forms, `rgb()`/`rgba()` and a few names.
pub fn parse_color(input: &str) -> Option<Color> {
    let s = input.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_args(args);
    }
    let (r, g, b) = match s.as_str() {
        "transparent" => return Some(Color::TRANSPARENT),
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        "silver" => (192, 192, 192),
        "yellow" => (255, 255, 0),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "navy" => (0, 0, 128),
        "teal" => (0, 128, 128),
        "maroon" => (128, 0, 0),
        _ => return None,
    };
    Some(Color::from_rgba8(r, g, b, 255))
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let (r, g, b, a) = match hex.len() {
        3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
        4 => (nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?),
        6 => (byte(0)?, byte(2)?, byte(4)?, 255),
        8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
        _ => return None,
    };
    Some(Color::from_rgba8(r, g, b, a))
}

fn parse_rgb_args(args: &str) -> Option<Color> {
    let parts: Vec<&str> = args
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |p: &str| -> Option<f32> {
        let v = match p.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok()? / 100.0,
            None => p.parse::<f32>().ok()? / 255.0,
        };
        v.is_finite().then(|| v.clamp(0.0, 1.0))
    };
    let alpha = match parts.get(3) {
        None => 1.0,
        Some(p) => {
            let v = match p.strip_suffix('%') {
                Some(pct) => pct.parse::<f32>().ok()? / 100.0,
                None => p.parse::<f32>().ok()?,
            };
            if !v.is_finite() {
                return None;
            }
            v.clamp(0.0, 1.0)
        }
    };
    Color::from_rgba(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha)
}

/// Text color for a style, falling back to the default watermark color.
pub fn text_color(style: &FontStyle) -> Color {
    parse_color(&style.color).unwrap_or_else(|| {
        log::warn!("unrecognized watermark color {:?}, using default", style.color);
        Color::from_rgba(0.0, 0.0, 0.0, 0.15).unwrap_or(Color::BLACK)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba8(c: Color) -> (u8, u8, u8, u8) {
        let c = c.to_color_u8();
        (c.red(), c.green(), c.blue(), c.alpha())
    }

    #[test]
    fn parses_common_color_forms() {
        assert_eq!(rgba8(parse_color("#f00").unwrap()), (255, 0, 0, 255));
        assert_eq!(rgba8(parse_color("#00ff0080").unwrap()), (0, 255, 0, 128));
        assert_eq!(rgba8(parse_color("rgb(0, 0, 255)").unwrap()), (0, 0, 255, 255));
        assert_eq!(rgba8(parse_color("RED").unwrap()), (255, 0, 0, 255));
        let faint = parse_color("rgba(0,0,0,0.15)").unwrap();
        assert!((faint.alpha() - 0.15).abs() < 1e-6);
        assert!(parse_color("not-a-color").is_none());
        assert!(parse_color("#12345").is_none());
        assert!(parse_color("rgb(1,2)").is_none());
    }

    #[test]
    fn font_size_handles_units_and_keywords() {
        assert_eq!(font_size_px(&"16px".into()), 16.0);
        assert_eq!(font_size_px(&NumberLike::Number(22.0)), 22.0);
        assert_eq!(font_size_px(&"large".into()), 18.0);
        assert_eq!(font_size_px(&"huge".into()), CANVAS_DEFAULT_FONT_SIZE);
        assert_eq!(font_size_px(&NumberLike::Number(0.0)), CANVAS_DEFAULT_FONT_SIZE);
    }

    #[test]
    fn font_weight_and_family() {
        assert_eq!(font_weight(&"normal".into()), 400);
        assert_eq!(font_weight(&"bold".into()), 700);
        assert_eq!(font_weight(&NumberLike::Number(600.0)), 600);
        assert_eq!(font_weight(&"250".into()), 250);
        assert_eq!(FontFamily::parse("'Noto Sans', sans-serif"), FontFamily::Named("Noto Sans".into()));
        assert_eq!(FontFamily::parse("monospace"), FontFamily::Monospace);
    }

    #[test]
    fn default_text_color_is_faint_black() {
        let c = text_color(&FontStyle::default());
        assert_eq!(c.red(), 0.0);
        assert!((c.alpha() - 0.15).abs() < 1e-6);
    }
}
