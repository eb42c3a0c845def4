//! Static theme registry: two variants, one named attribute set.
//!
//! A field per attribute keeps the light/dark variants structurally
//! symmetric; a variant cannot drop a key the other one has.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn toggle(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    /// Default text color applied when inline style leaves `color` unset.
    pub text_color: &'static str,
    /// Default background applied when `background-color` is unset.
    pub bg_color: &'static str,

    pub user_msg_bg: &'static str,
    pub user_msg_text: &'static str,
    pub bot_msg_bg: &'static str,
    pub bot_msg_text: &'static str,
    pub typing_bg: &'static str,
    pub typing_text: &'static str,

    // Per-tag accents used by the fragment renderer's class bundles.
    pub strong_color: &'static str,
    pub b_color: &'static str,
    pub em_color: &'static str,
    pub i_color: &'static str,
    pub p_color: &'static str,
    pub li_color: &'static str,
    pub h1_color: &'static str,
    pub h2_color: &'static str,
    pub h3_color: &'static str,
    pub span_color: &'static str,
    pub div_color: &'static str,
    pub ul_color: &'static str,
    pub ol_color: &'static str,
    pub hr_color: &'static str,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            text_color: "#1f2937",
            bg_color: "",
            user_msg_bg: "bg-blue-500",
            user_msg_text: "text-white",
            bot_msg_bg: "bg-gray-200",
            bot_msg_text: "text-gray-800",
            typing_bg: "bg-gray-200",
            typing_text: "text-gray-700",
            strong_color: "text-gray-700",
            b_color: "text-blue-600",
            em_color: "text-green-600",
            i_color: "text-purple-600",
            p_color: "text-gray-700",
            li_color: "text-gray-700",
            h1_color: "text-black",
            h2_color: "text-gray-900",
            h3_color: "text-gray-800",
            span_color: "text-gray-700",
            div_color: "text-gray-800",
            ul_color: "text-gray-800",
            ol_color: "text-gray-800",
            hr_color: "border-gray-400",
        }
    }

    pub fn dark() -> Self {
        Self {
            text_color: "#e5e7eb",
            bg_color: "",
            user_msg_bg: "bg-blue-700",
            user_msg_text: "text-white",
            bot_msg_bg: "bg-gray-700",
            bot_msg_text: "text-gray-200",
            typing_bg: "bg-gray-700",
            typing_text: "text-gray-300",
            strong_color: "text-gray-300",
            b_color: "text-blue-400",
            em_color: "text-green-400",
            i_color: "text-purple-400",
            p_color: "text-gray-300",
            li_color: "text-gray-300",
            h1_color: "text-white",
            h2_color: "text-gray-300",
            h3_color: "text-gray-300",
            span_color: "text-gray-300",
            div_color: "text-gray-200",
            ul_color: "text-gray-200",
            ol_color: "text-gray-200",
            hr_color: "border-gray-600",
        }
    }

    pub fn for_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Light => Self::light(),
            ThemeMode::Dark => Self::dark(),
        }
    }
}
