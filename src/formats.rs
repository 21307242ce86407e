//! Static registry of supported paper formats.
//!
//! Both renderers resolve their geometry exclusively through this table;
//! no width or height constant lives anywhere else. Unknown keys resolve
//! to the 80 mm thermal default rather than failing.

use serde::Serialize;

/// Physical class of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// Continuous-roll thermal paper, driven via raw ESC/POS.
    Thermal,
    /// Cut-sheet paper, driven via rendered HTML.
    Paper,
}

/// A registry entry. Immutable for the process lifetime.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PaperFormat {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: FormatKind,
    /// Width in millimetres.
    pub width_mm: u32,
    /// Height in millimetres; `None` for continuous thermal rolls.
    pub height_mm: Option<u32>,
    pub description: &'static str,
}

impl PaperFormat {
    pub fn is_thermal(&self) -> bool {
        self.kind == FormatKind::Thermal
    }

    /// Character columns for the monospaced thermal layout.
    pub fn columns(&self) -> usize {
        if self.width_mm <= 58 {
            32
        } else {
            48
        }
    }
}

/// Registry key of the default format.
pub const DEFAULT_FORMAT: &str = "THERMAL_80MM";

static FORMATS: &[PaperFormat] = &[
    PaperFormat {
        id: "THERMAL_80MM",
        name: "Thermal 80mm",
        kind: FormatKind::Thermal,
        width_mm: 80,
        height_mm: None,
        description: "Standard 80mm receipt roll",
    },
    PaperFormat {
        id: "THERMAL_58MM",
        name: "Thermal 58mm",
        kind: FormatKind::Thermal,
        width_mm: 58,
        height_mm: None,
        description: "Compact 58mm receipt roll",
    },
    PaperFormat {
        id: "A4",
        name: "A4",
        kind: FormatKind::Paper,
        width_mm: 210,
        height_mm: Some(297),
        description: "ISO A4 sheet",
    },
    PaperFormat {
        id: "A5",
        name: "A5",
        kind: FormatKind::Paper,
        width_mm: 148,
        height_mm: Some(210),
        description: "ISO A5 sheet",
    },
    PaperFormat {
        id: "LETTER",
        name: "Letter",
        kind: FormatKind::Paper,
        width_mm: 216,
        height_mm: Some(279),
        description: "US Letter sheet",
    },
];

/// Look up a format by id. Unknown ids resolve to [`DEFAULT_FORMAT`],
/// which is the first registry entry.
pub fn lookup(id: &str) -> &'static PaperFormat {
    FORMATS
        .iter()
        .find(|f| f.id.eq_ignore_ascii_case(id.trim()))
        .unwrap_or(&FORMATS[0])
}

/// All registry entries, for settings screens.
pub fn all() -> &'static [PaperFormat] {
    FORMATS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_format() {
        let f = lookup("THERMAL_58MM");
        assert_eq!(f.width_mm, 58);
        assert!(f.is_thermal());
        assert_eq!(f.columns(), 32);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("a4").id, "A4");
    }

    #[test]
    fn test_unknown_key_resolves_to_default() {
        let f = lookup("RECEIPT_2000");
        assert_eq!(f.id, DEFAULT_FORMAT);
        assert_eq!(f.columns(), 48);
    }

    #[test]
    fn test_sheet_formats_declare_height() {
        for f in all().iter().filter(|f| !f.is_thermal()) {
            assert!(f.height_mm.is_some(), "{} must declare a height", f.id);
        }
    }

    #[test]
    fn test_thermal_formats_are_continuous() {
        for f in all().iter().filter(|f| f.is_thermal()) {
            assert!(f.height_mm.is_none(), "{} must be continuous", f.id);
        }
    }
}
