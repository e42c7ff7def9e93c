//! Raw-code right-shift policy per module family.
//!
//! Raw channel words carry the ADC code left-justified in a container wider
//! than the converter. The shift that recovers the code depends on the module
//! family and on the `data32` / `adc_18b` format knobs. Volts calibration is
//! normalised to 24 bits, so a volts-bound shift keeps 8 more bits.

/// Format knobs of one module, as read from its site service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleFormat {
    pub model: String,
    pub data32: bool,
    pub adc_18b: bool,
}

impl ModuleFormat {
    /// Build from raw knob replies (`"1"` means set).
    pub fn from_knobs(model: &str, data32: &str, adc_18b: &str) -> Self {
        Self {
            model: model.trim().to_owned(),
            data32: data32.trim() == "1",
            adc_18b: adc_18b.trim() == "1",
        }
    }
}

enum Matcher {
    ModelPrefix(&'static str),
    Data32 { adc_18b: bool },
}

impl Matcher {
    fn matches(&self, fmt: &ModuleFormat) -> bool {
        match *self {
            Self::ModelPrefix(prefix) => fmt.model.starts_with(prefix),
            Self::Data32 { adc_18b } => fmt.data32 && fmt.adc_18b == adc_18b,
        }
    }
}

struct Rule {
    matcher: Matcher,
    shift: u32,
    volts_keeps_8: bool,
}

/// Evaluated in order; the first match wins. No match means no shift.
const RULES: &[Rule] = &[
    Rule {
        matcher: Matcher::ModelPrefix("ACQ43"),
        shift: 8,
        volts_keeps_8: false,
    },
    Rule {
        matcher: Matcher::Data32 { adc_18b: true },
        shift: 14,
        volts_keeps_8: true,
    },
    Rule {
        matcher: Matcher::Data32 { adc_18b: false },
        shift: 16,
        volts_keeps_8: true,
    },
];

/// Right shift to apply to raw words of a module with format `fmt`.
pub fn rshift(fmt: &ModuleFormat, volts: bool) -> u32 {
    RULES
        .iter()
        .find(|r| r.matcher.matches(fmt))
        .map_or(0, |r| {
            if volts && r.volts_keeps_8 {
                r.shift - 8
            } else {
                r.shift
            }
        })
}

/// Arithmetic right shift of every raw word.
pub fn apply_shift(raw: &[i32], shift: u32) -> Vec<i32> {
    raw.iter().map(|&x| x >> shift).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(model: &str, data32: bool, adc_18b: bool) -> ModuleFormat {
        ModuleFormat {
            model: model.into(),
            data32,
            adc_18b,
        }
    }

    #[test]
    fn acq43x_always_shifts_8() {
        assert_eq!(rshift(&fmt("ACQ437ELF", true, false), false), 8);
        assert_eq!(rshift(&fmt("ACQ430FMC", true, false), true), 8);
    }

    #[test]
    fn data32_18bit() {
        assert_eq!(rshift(&fmt("ACQ424ELF", true, true), false), 14);
        assert_eq!(rshift(&fmt("ACQ424ELF", true, true), true), 6);
    }

    #[test]
    fn data32_16bit() {
        assert_eq!(rshift(&fmt("ACQ480FMC", true, false), false), 16);
        assert_eq!(rshift(&fmt("ACQ480FMC", true, false), true), 8);
    }

    #[test]
    fn narrow_formats_unshifted() {
        assert_eq!(rshift(&fmt("ACQ425ELF", false, false), false), 0);
        assert_eq!(rshift(&fmt("ACQ425ELF", false, true), true), 0);
    }

    #[test]
    fn from_knob_replies() {
        let f = ModuleFormat::from_knobs("ACQ424ELF\n", "1", "0\n");
        assert!(f.data32);
        assert!(!f.adc_18b);
        assert_eq!(f.model, "ACQ424ELF");
    }

    #[test]
    fn shift_is_arithmetic() {
        assert_eq!(apply_shift(&[256, -256, 0x7fff_ff00], 8), vec![1, -1, 0x7f_ffff]);
    }
}
