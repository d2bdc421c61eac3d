use std::fmt;
use std::str::FromStr;
use viewer_core::ViewportSize;

/// One replayed user or host action for `navigate --event`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// `scroll:<offset>`: the pager scrolled to `offset` along its axis.
    Scroll(f64),
    /// `thumb:<index>`: a thumbnail for zero-based page `index` was tapped.
    Thumb(u32),
    /// `sitemap:<row>`: the sitemap row was tapped.
    Sitemap(usize),
    /// `goto:<index>`: host API jump; out-of-range values are clamped.
    Goto(i64),
    /// `resize:<W>x<H>`
    Resize(ViewportSize),
    /// `tap-strip:<x>`: tap at strip coordinate `x`.
    TapStrip(f64),
    /// `scroll-strip:<offset>`
    ScrollStrip(f64),
    /// `begin-transition` / `end-transition`
    BeginTransition,
    EndTransition,
    /// `layout`
    Layout,
}

impl FromStr for Event {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, argument) = match value.split_once(':') {
            Some((name, argument)) => (name, Some(argument)),
            None => (value, None),
        };

        let event = match (name, argument) {
            ("scroll", Some(arg)) => Self::Scroll(number(name, arg)?),
            ("thumb", Some(arg)) => Self::Thumb(number(name, arg)?),
            ("sitemap", Some(arg)) => Self::Sitemap(number(name, arg)?),
            ("goto", Some(arg)) => Self::Goto(number(name, arg)?),
            ("resize", Some(arg)) => Self::Resize(parse_viewport(arg)?),
            ("tap-strip", Some(arg)) => Self::TapStrip(number(name, arg)?),
            ("scroll-strip", Some(arg)) => Self::ScrollStrip(number(name, arg)?),
            ("begin-transition", None) => Self::BeginTransition,
            ("end-transition", None) => Self::EndTransition,
            ("layout", None) => Self::Layout,
            _ => return Err(format!("unknown event `{value}`")),
        };

        Ok(event)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scroll(offset) => write!(f, "scroll:{offset}"),
            Self::Thumb(index) => write!(f, "thumb:{index}"),
            Self::Sitemap(row) => write!(f, "sitemap:{row}"),
            Self::Goto(index) => write!(f, "goto:{index}"),
            Self::Resize(viewport) => write!(f, "resize:{}x{}", viewport.width, viewport.height),
            Self::TapStrip(x) => write!(f, "tap-strip:{x}"),
            Self::ScrollStrip(offset) => write!(f, "scroll-strip:{offset}"),
            Self::BeginTransition => f.write_str("begin-transition"),
            Self::EndTransition => f.write_str("end-transition"),
            Self::Layout => f.write_str("layout"),
        }
    }
}

/// Parses `<W>x<H>`.
pub fn parse_viewport(value: &str) -> Result<ViewportSize, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected <W>x<H>, got `{value}`"))?;
    let width: f64 = number("width", width)?;
    let height: f64 = number("height", height)?;

    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return Err(format!("viewport must be positive, got `{value}`"));
    }

    Ok(ViewportSize { width, height })
}

fn number<T: FromStr>(what: &str, value: &str) -> Result<T, String> {
    value.trim().parse().map_err(|_| format!("invalid {what} value `{value}`"))
}
