//! Resolution of inline CSS lengths to pixels.
//!
//! Only what the grid probe and placeholders need: absolute and font-relative
//! dimensions, viewport units, unitless multiples of the font size and
//! `var(--name, fallback)` substitution.

use std::collections::HashMap;

use cssparser::{ParseError, Parser, ParserInput, Token};

/// Guard against `var()` chains that reference each other.
const MAX_VAR_DEPTH: usize = 16;

/// Environment used to turn relative units into pixels.
#[derive(Copy, Clone, Debug)]
pub struct LengthContext<'props> {
    pub font_size_px: f64,
    pub root_font_size_px: f64,
    /// Advance of the `0` glyph, used by `ch`.
    pub char_width_px: f64,
    pub viewport_width_px: f64,
    pub viewport_height_px: f64,
    pub custom_properties: &'props HashMap<String, String>,
}

impl LengthContext<'_> {
    fn dimension_px(&self, value: f64, unit: &str) -> Option<f64> {
        let px = match unit.to_ascii_lowercase().as_str() {
            "px" => value,
            "rem" => value * self.root_font_size_px,
            "em" => value * self.font_size_px,
            "ch" => value * self.char_width_px,
            "vw" => value * self.viewport_width_px / 100.0,
            "vh" => value * self.viewport_height_px / 100.0,
            _ => return None,
        };
        Some(px)
    }

    fn custom_property(&self, name: &str) -> Option<&str> {
        self.custom_properties
            .get(name)
            .map(String::as_str)
            .filter(|raw| !raw.trim().is_empty())
    }
}

/// Resolve a single length value to pixels. Returns `None` when the value is
/// not a supported length or references an unset property without fallback.
pub fn resolve_length(value: &str, context: &LengthContext<'_>) -> Option<f64> {
    resolve_with_depth(value, context, 0)
}

fn resolve_with_depth(value: &str, context: &LengthContext<'_>, depth: usize) -> Option<f64> {
    if depth > MAX_VAR_DEPTH {
        return None;
    }
    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);
    parser
        .parse_entirely(|inner| parse_length(inner, context, depth))
        .ok()
}

fn parse_length<'src>(
    input: &mut Parser<'src, '_>,
    context: &LengthContext<'_>,
    depth: usize,
) -> Result<f64, ParseError<'src, ()>> {
    let location = input.current_source_location();
    let token = input.next()?.clone();
    match token {
        Token::Dimension {
            value, ref unit, ..
        } => context
            .dimension_px(f64::from(value), unit)
            .ok_or_else(|| location.new_custom_error(())),
        Token::Number { value, .. } => Ok(f64::from(value) * context.font_size_px),
        Token::Function(ref name) if name.eq_ignore_ascii_case("var") => {
            input.parse_nested_block(|block| {
                let property = block.expect_ident()?.clone();
                if let Some(raw) = context.custom_property(&property) {
                    let Some(px) = resolve_with_depth(raw, context, depth + 1) else {
                        return Err(block.new_custom_error(()));
                    };
                    // The fallback is unused but must still be consumed.
                    while !block.is_exhausted() {
                        block.next()?;
                    }
                    return Ok(px);
                }
                block.expect_comma()?;
                parse_length(block, context, depth)
            })
        }
        other => Err(location.new_unexpected_token_error(other)),
    }
}
