use ratatui::style::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Midnight,
}

/// Resolved colors for one theme variant.
pub struct Palette {
    pub accent: Color,
    pub text: Color,
    pub dim: Color,
    pub user: Color,
    pub assistant: Color,
    pub error: Color,
    pub bar_bg: Color,
    pub bar_fg: Color,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
            Theme::Midnight => "midnight",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dark" => Some(Theme::Dark),
            "light" => Some(Theme::Light),
            "midnight" => Some(Theme::Midnight),
            _ => None,
        }
    }

    pub fn all() -> Vec<Theme> {
        vec![Theme::Dark, Theme::Light, Theme::Midnight]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Theme::Dark => "Dark",
            Theme::Light => "Light",
            Theme::Midnight => "Midnight",
        }
    }

    pub fn next(&self) -> Theme {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Midnight,
            Theme::Midnight => Theme::Dark,
        }
    }

    pub fn palette(&self) -> Palette {
        match self {
            Theme::Dark => Palette {
                accent: Color::Cyan,
                text: Color::White,
                dim: Color::DarkGray,
                user: Color::Green,
                assistant: Color::Cyan,
                error: Color::Red,
                bar_bg: Color::DarkGray,
                bar_fg: Color::White,
            },
            Theme::Light => Palette {
                accent: Color::Blue,
                text: Color::Black,
                dim: Color::Gray,
                user: Color::Green,
                assistant: Color::Blue,
                error: Color::Red,
                bar_bg: Color::Gray,
                bar_fg: Color::Black,
            },
            Theme::Midnight => Palette {
                accent: Color::Magenta,
                text: Color::White,
                dim: Color::DarkGray,
                user: Color::Yellow,
                assistant: Color::Magenta,
                error: Color::LightRed,
                bar_bg: Color::Black,
                bar_fg: Color::White,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        for theme in Theme::all() {
            assert_eq!(Theme::from_str(theme.as_str()), Some(theme));
        }
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(Theme::from_str("solarized"), None);
    }
}
