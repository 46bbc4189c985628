//! Privilege modes and the per-mode filtering of the shared register file.
//!
//! A CLIC stores one set of per-interrupt registers; the S- and U-mode
//! apertures are overlays onto it. An interrupt owned by a higher privilege
//! mode is hard-wired zero in a lower mode's aperture.

use crate::bits;

/// RISC-V privilege mode, in the machine encoding. Encoding 2 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrivMode {
    User = 0,
    Supervisor = 1,
    Machine = 3,
}

impl PrivMode {
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Decode a 2-bit mode field. The reserved encoding yields `None`.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x3 {
            0 => Some(PrivMode::User),
            1 => Some(PrivMode::Supervisor),
            3 => Some(PrivMode::Machine),
            _ => None,
        }
    }
}

/// Work out the effective privilege mode of an interrupt from the raw
/// `clicintattr.mode` field, given how many mode bits `nmbits` honors.
///
/// | priv-modes | nmbits | raw | effective           |
/// |------------|--------|-----|---------------------|
/// | M          | 0      | xx  | M                   |
/// | M/S, M/S/U | 1      | 0x  | S                   |
/// | M/U        | 1      | 0x  | U                   |
/// | any        | 1      | 1x  | M                   |
/// | M/S/U      | 2      | 00  | U                   |
/// | M/S/U      | 2      | 01  | S                   |
/// | M/S/U      | 2      | 10  | reserved (`None`)   |
/// | M/S/U      | 2      | 11  | M                   |
///
/// On a write the caller retains the previously stored mode when the
/// effective mode is reserved.
pub(crate) fn effective_mode(
    nmbits: u8,
    supports_s: bool,
    supports_u: bool,
    raw: u8,
) -> Option<PrivMode> {
    match nmbits {
        0 => Some(PrivMode::Machine),
        1 => {
            if raw <= PrivMode::Supervisor.bits() {
                if supports_s {
                    Some(PrivMode::Supervisor)
                } else if supports_u {
                    Some(PrivMode::User)
                } else {
                    Some(PrivMode::Machine)
                }
            } else {
                Some(PrivMode::Machine)
            }
        }
        _ => PrivMode::from_bits(raw),
    }
}

/// Effective mode of a stored `clicintattr` byte. Stored attributes are
/// always a coerced legal value, so the result is total.
pub(crate) fn stored_mode(nmbits: u8, supports_s: bool, supports_u: bool, attr: u8) -> PrivMode {
    effective_mode(nmbits, supports_s, supports_u, bits::attr_mode_bits(attr))
        .unwrap_or(PrivMode::Machine)
}

/// Apply the effective mode of a stored attribute byte to its mode field,
/// producing the observable register value.
pub(crate) fn attr_observable(nmbits: u8, supports_s: bool, supports_u: bool, attr: u8) -> u8 {
    let mode = stored_mode(nmbits, supports_s, supports_u, attr);
    bits::attr_set_mode(attr, mode.bits())
}

/// Whether an interrupt with effective mode `owner` is visible through an
/// aperture of mode `access`.
///
/// Interrupts that are not visible appear as hard-wired zeros in all four
/// per-interrupt registers, and writes to them are dropped.
pub(crate) fn check_visible(
    access: PrivMode,
    supports_s: bool,
    supports_u: bool,
    nmbits: u8,
    owner: PrivMode,
) -> bool {
    match (supports_s, supports_u) {
        // M-only
        (false, false) => access == PrivMode::Machine,
        // M/S/U
        (true, true) => match nmbits {
            0 => access == PrivMode::Machine,
            1 => access == PrivMode::Machine || owner <= PrivMode::Supervisor,
            _ => access >= owner,
        },
        // M/S or M/U
        _ => match nmbits {
            0 => access == PrivMode::Machine,
            _ => access == PrivMode::Machine || owner <= PrivMode::Supervisor,
        },
    }
}

/// Largest legal `cliccfg.nmbits` for the supported mode set.
pub(crate) fn max_nmbits(supports_s: bool, supports_u: bool) -> u8 {
    match (supports_s, supports_u) {
        (true, true) => 2,
        (false, false) => 0,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_ordering_follows_privilege() {
        assert!(PrivMode::User < PrivMode::Supervisor);
        assert!(PrivMode::Supervisor < PrivMode::Machine);
        assert_eq!(PrivMode::from_bits(2), None);
        assert_eq!(PrivMode::from_bits(3), Some(PrivMode::Machine));
    }

    #[test]
    fn effective_mode_interpretation_table() {
        // nmbits = 0: everything is machine
        for raw in 0..4 {
            assert_eq!(effective_mode(0, true, true, raw), Some(PrivMode::Machine));
        }
        // nmbits = 1 on M/S: low encodings collapse to S
        assert_eq!(effective_mode(1, true, false, 0), Some(PrivMode::Supervisor));
        assert_eq!(effective_mode(1, true, false, 1), Some(PrivMode::Supervisor));
        assert_eq!(effective_mode(1, true, false, 3), Some(PrivMode::Machine));
        // nmbits = 1 on M/U: low encodings collapse to U
        assert_eq!(effective_mode(1, false, true, 0), Some(PrivMode::User));
        assert_eq!(effective_mode(1, false, true, 2), Some(PrivMode::Machine));
        // nmbits = 2 on M/S/U: pass-through with 2 reserved
        assert_eq!(effective_mode(2, true, true, 0), Some(PrivMode::User));
        assert_eq!(effective_mode(2, true, true, 1), Some(PrivMode::Supervisor));
        assert_eq!(effective_mode(2, true, true, 2), None);
        assert_eq!(effective_mode(2, true, true, 3), Some(PrivMode::Machine));
    }

    #[test]
    fn visibility_m_only() {
        assert!(check_visible(PrivMode::Machine, false, false, 0, PrivMode::Machine));
        assert!(!check_visible(PrivMode::Supervisor, false, false, 0, PrivMode::Machine));
        assert!(!check_visible(PrivMode::User, false, false, 0, PrivMode::Machine));
    }

    #[test]
    fn visibility_msu() {
        // nmbits = 0: only the machine aperture sees anything
        assert!(!check_visible(PrivMode::Supervisor, true, true, 0, PrivMode::Machine));
        // nmbits = 1: S and U apertures see interrupts owned below machine
        assert!(check_visible(PrivMode::Supervisor, true, true, 1, PrivMode::Supervisor));
        assert!(check_visible(PrivMode::User, true, true, 1, PrivMode::Supervisor));
        assert!(!check_visible(PrivMode::Supervisor, true, true, 1, PrivMode::Machine));
        // nmbits = 2: an aperture sees interrupts at or below its own mode
        assert!(check_visible(PrivMode::Supervisor, true, true, 2, PrivMode::User));
        assert!(!check_visible(PrivMode::User, true, true, 2, PrivMode::Supervisor));
        assert!(check_visible(PrivMode::Machine, true, true, 2, PrivMode::Supervisor));
    }

    #[test]
    fn visibility_two_mode_harts() {
        assert!(check_visible(PrivMode::Supervisor, true, false, 1, PrivMode::Supervisor));
        assert!(!check_visible(PrivMode::Supervisor, true, false, 0, PrivMode::Machine));
        assert!(check_visible(PrivMode::User, false, true, 1, PrivMode::User));
        assert!(!check_visible(PrivMode::User, false, true, 1, PrivMode::Machine));
    }

    #[test]
    fn observable_attr_reapplies_mode() {
        // stored raw mode 0 under nmbits=1 on M/S reads back as S
        let attr = 0x05; // negative-level, shv, raw mode 0
        assert_eq!(attr_observable(1, true, false, attr), 0x45);
        // nmbits=0 always reads back machine
        assert_eq!(attr_observable(0, true, false, attr), 0xc5);
    }
}
