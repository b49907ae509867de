// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Text and input masking.
//!
//! A mask replaces content with a non-reversible surrogate of the same
//! length; the replayer shows the shape of the data without the data.

use std::rc::Rc;

/// Custom text masker: `(text, element)` → masked text.
pub type MaskTextFn = Rc<dyn Fn(&str, &web_sys::Element) -> String>;

/// Custom input masker: `(value, element)` → masked value.
pub type MaskInputFn = Rc<dyn Fn(&str, &web_sys::Element) -> String>;

/// The kind of form control being masked, as derived from the tag name and
/// the `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Color,
    Date,
    DatetimeLocal,
    Email,
    Month,
    Number,
    Range,
    Search,
    Tel,
    Text,
    Time,
    Url,
    Week,
    TextArea,
    Select,
    Password,
}

impl InputKind {
    /// Maps a lowercased `type` attribute to a kind; unknown types fall back
    /// to `Text`, which is how browsers treat them too.
    pub fn from_input_type(ty: &str) -> Self {
        match ty {
            "color" => Self::Color,
            "date" => Self::Date,
            "datetime-local" => Self::DatetimeLocal,
            "email" => Self::Email,
            "month" => Self::Month,
            "number" => Self::Number,
            "range" => Self::Range,
            "search" => Self::Search,
            "tel" => Self::Tel,
            "time" => Self::Time,
            "url" => Self::Url,
            "week" => Self::Week,
            "password" => Self::Password,
            _ => Self::Text,
        }
    }
}

/// Which form controls get their values masked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskInputOptions {
    pub color: bool,
    pub date: bool,
    pub datetime_local: bool,
    pub email: bool,
    pub month: bool,
    pub number: bool,
    pub range: bool,
    pub search: bool,
    pub tel: bool,
    pub text: bool,
    pub time: bool,
    pub url: bool,
    pub week: bool,
    pub text_area: bool,
    pub select: bool,
    /// Passwords are always masked, regardless of configuration.
    pub password: bool,
}

impl Default for MaskInputOptions {
    fn default() -> Self {
        Self::none()
    }
}

impl MaskInputOptions {
    /// Mask nothing but passwords.
    pub fn none() -> Self {
        Self {
            color: false,
            date: false,
            datetime_local: false,
            email: false,
            month: false,
            number: false,
            range: false,
            search: false,
            tel: false,
            text: false,
            time: false,
            url: false,
            week: false,
            text_area: false,
            select: false,
            password: true,
        }
    }

    /// Mask every kind of control (`maskAllInputs`).
    pub fn all() -> Self {
        Self {
            color: true,
            date: true,
            datetime_local: true,
            email: true,
            month: true,
            number: true,
            range: true,
            search: true,
            tel: true,
            text: true,
            time: true,
            url: true,
            week: true,
            text_area: true,
            select: true,
            password: true,
        }
    }

    pub fn masks(&self, kind: InputKind) -> bool {
        match kind {
            InputKind::Color => self.color,
            InputKind::Date => self.date,
            InputKind::DatetimeLocal => self.datetime_local,
            InputKind::Email => self.email,
            InputKind::Month => self.month,
            InputKind::Number => self.number,
            InputKind::Range => self.range,
            InputKind::Search => self.search,
            InputKind::Text => self.text,
            InputKind::Tel => self.tel,
            InputKind::Time => self.time,
            InputKind::Url => self.url,
            InputKind::Week => self.week,
            InputKind::TextArea => self.text_area,
            InputKind::Select => self.select,
            InputKind::Password => self.password,
        }
    }
}

/// Replaces every non-whitespace character with `*`, or delegates to the
/// configured masker. Whitespace is kept so text layout survives replay.
pub fn mask_text(text: &str, element: &web_sys::Element, mask_fn: Option<&MaskTextFn>) -> String {
    match mask_fn {
        Some(f) => f(text, element),
        None => text
            .chars()
            .map(|c| if c.is_whitespace() { c } else { '*' })
            .collect(),
    }
}

/// Masks an input value when the policy says so, otherwise passes it through.
pub fn mask_input_value(
    value: &str,
    kind: InputKind,
    options: &MaskInputOptions,
    element: &web_sys::Element,
    mask_fn: Option<&MaskInputFn>,
) -> String {
    if !options.masks(kind) {
        return value.to_owned();
    }
    match mask_fn {
        Some(f) => f(value, element),
        None => "*".repeat(value.chars().count()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_mask_preserves_length() {
        assert_eq!("*".repeat("secret".chars().count()), "******");
    }

    #[test]
    fn input_kind_from_type() {
        assert_eq!(InputKind::from_input_type("password"), InputKind::Password);
        assert_eq!(InputKind::from_input_type("datetime-local"), InputKind::DatetimeLocal);
        assert_eq!(InputKind::from_input_type("custom-thing"), InputKind::Text);
    }

    #[test]
    fn password_always_masked() {
        let none = MaskInputOptions::none();
        assert!(none.masks(InputKind::Password));
        assert!(!none.masks(InputKind::Text));
        assert!(MaskInputOptions::all().masks(InputKind::Select));
    }
}
