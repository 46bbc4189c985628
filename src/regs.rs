//! MMIO decoding of the control region and the per-interrupt registers.
//!
//! All accesses arrive here with the aperture's access mode already
//! privilege-checked. Guest errors (unknown offsets, unaligned control
//! accesses, out-of-range interrupt numbers) are logged and recovered
//! locally: reads return zero, writes are dropped.

use log::warn;

use crate::consts::*;
use crate::mode::{self, PrivMode};
use crate::state::HartState;
use crate::{ClicConfig, HartOps, Version};

use axaddrspace::device::AccessWidth;

fn width_bytes(width: AccessWidth) -> usize {
    match width {
        AccessWidth::Byte => 1,
        AccessWidth::Word => 2,
        AccessWidth::Dword => 4,
        AccessWidth::Qword => 8,
    }
}

fn width_mask(width: AccessWidth) -> u64 {
    match width {
        AccessWidth::Qword => u64::MAX,
        _ => (1u64 << (8 * width_bytes(width))) - 1,
    }
}

impl HartState {
    pub(crate) fn mmio_read(
        &self,
        cfg: &ClicConfig,
        access: PrivMode,
        offset: usize,
        width: AccessWidth,
    ) -> u64 {
        if offset < CLIC_INTCTL_BASE {
            u64::from(self.control_read(cfg, access, offset)) & width_mask(width)
        } else {
            // per-interrupt registers are byte-wide; wider accesses decompose
            // little-endian, re-resolving the interrupt for every byte
            let mut value = 0u64;
            for i in 0..width_bytes(width) {
                let rel = offset - CLIC_INTCTL_BASE + i;
                value |= u64::from(self.irq_reg_read(cfg, access, rel)) << (8 * i);
            }
            value
        }
    }

    pub(crate) fn mmio_write(
        &mut self,
        cfg: &ClicConfig,
        hart: &dyn HartOps,
        access: PrivMode,
        offset: usize,
        width: AccessWidth,
        value: u64,
    ) {
        if offset < CLIC_INTCTL_BASE {
            self.control_write(cfg, hart, access, offset, value as u32);
        } else {
            for i in 0..width_bytes(width) {
                let rel = offset - CLIC_INTCTL_BASE + i;
                self.irq_reg_write(cfg, hart, access, rel, (value >> (8 * i)) as u8);
            }
        }
    }

    // --- control region ---

    fn control_read(&self, cfg: &ClicConfig, access: PrivMode, offset: usize) -> u32 {
        if offset % 4 != 0 {
            warn!("clic: unaligned control register read at {offset:#x}");
            return 0;
        }
        match offset {
            CLIC_CLICCFG => self.read_cliccfg(cfg, access),
            CLIC_MINTTHRESH if cfg.version == Version::V0_8 => self.mintthresh,
            _ => match inttrig_index(offset) {
                Some(n) => self.inttrig[n] & CLIC_INTTRIG_MASK,
                None => {
                    warn!("clic: invalid read at {offset:#x}");
                    0
                }
            },
        }
    }

    fn control_write(
        &mut self,
        cfg: &ClicConfig,
        hart: &dyn HartOps,
        access: PrivMode,
        offset: usize,
        value: u32,
    ) {
        if offset % 4 != 0 {
            warn!("clic: unaligned control register write at {offset:#x}");
            return;
        }
        match offset {
            CLIC_CLICCFG => {
                let (changed, nmbits_changed) = self.write_cliccfg(cfg, access, value);
                if nmbits_changed {
                    self.rebuild_active(cfg);
                }
                if changed {
                    self.next_interrupt(cfg, hart);
                }
            }
            CLIC_MINTTHRESH if cfg.version == Version::V0_8 => {
                if self.mintthresh != value {
                    self.mintthresh = value;
                    self.next_interrupt(cfg, hart);
                }
            }
            _ => match inttrig_index(offset) {
                Some(n) => {
                    let irqn = value & CLIC_INTTRIG_IRQN;
                    if irqn as usize <= cfg.num_sources {
                        self.inttrig[n] = value & CLIC_INTTRIG_MASK;
                    }
                }
                None => warn!("clic: invalid write at {offset:#x}"),
            },
        }
    }

    /// Observable `cliccfg`: every field is filtered by the access mode, so
    /// an aperture only sees the configuration of its own mode and below.
    fn read_cliccfg(&self, cfg: &ClicConfig, access: PrivMode) -> u32 {
        let mut value = 0;
        if access == PrivMode::Machine {
            value = u32::from(self.mnlbits) << CLICCFG_MNLBITS_SHIFT
                | u32::from(self.nmbits) << CLICCFG_NMBITS_SHIFT;
        }
        if cfg.supports_s() && access >= PrivMode::Supervisor {
            value |= u32::from(self.snlbits) << CLICCFG_SNLBITS_SHIFT;
        }
        if cfg.supports_u() {
            value |= u32::from(self.unlbits) << CLICCFG_UNLBITS_SHIFT;
        }
        value
    }

    /// WARL `cliccfg` write. Out-of-range field values leave the stored
    /// field untouched; fields above the access mode are ignored.
    /// Returns (anything changed, nmbits changed).
    fn write_cliccfg(&mut self, cfg: &ClicConfig, access: PrivMode, value: u32) -> (bool, bool) {
        let mnlbits = ((value >> CLICCFG_MNLBITS_SHIFT) & CLICCFG_MNLBITS_MASK) as u8;
        let nmbits = ((value >> CLICCFG_NMBITS_SHIFT) & CLICCFG_NMBITS_MASK) as u8;
        let snlbits = ((value >> CLICCFG_SNLBITS_SHIFT) & CLICCFG_SNLBITS_MASK) as u8;
        let unlbits = ((value >> CLICCFG_UNLBITS_SHIFT) & CLICCFG_UNLBITS_MASK) as u8;

        let mut changed = false;
        let mut nmbits_changed = false;

        if access == PrivMode::Machine && mnlbits <= 8 && self.mnlbits != mnlbits {
            self.mnlbits = mnlbits;
            changed = true;
        }
        if cfg.supports_s()
            && access >= PrivMode::Supervisor
            && snlbits <= 8
            && self.snlbits != snlbits
        {
            self.snlbits = snlbits;
            changed = true;
        }
        if cfg.supports_u() && unlbits <= 8 && self.unlbits != unlbits {
            self.unlbits = unlbits;
            changed = true;
        }
        if access == PrivMode::Machine
            && nmbits <= mode::max_nmbits(cfg.supports_s(), cfg.supports_u())
            && self.nmbits != nmbits
        {
            self.nmbits = nmbits;
            changed = true;
            nmbits_changed = true;
        }

        (changed, nmbits_changed)
    }

    // --- per-interrupt registers ---

    fn irq_reg_read(&self, cfg: &ClicConfig, access: PrivMode, rel: usize) -> u8 {
        let irq = rel / 4;
        if irq >= cfg.num_sources {
            warn!("clic: invalid irq {irq} read at {:#x}", rel + CLIC_INTCTL_BASE);
            return 0;
        }
        if !self.visible(cfg, access, irq) {
            return 0;
        }
        match rel % 4 {
            0 => self.read_intip(irq),
            1 => self.read_intie(irq),
            2 => self.read_intattr(cfg, irq),
            _ => self.read_intctl(cfg, irq),
        }
    }

    fn irq_reg_write(
        &mut self,
        cfg: &ClicConfig,
        hart: &dyn HartOps,
        access: PrivMode,
        rel: usize,
        value: u8,
    ) {
        let irq = rel / 4;
        if irq >= cfg.num_sources {
            warn!("clic: invalid irq {irq} write at {:#x}", rel + CLIC_INTCTL_BASE);
            return;
        }
        if !self.visible(cfg, access, irq) {
            return;
        }
        match rel % 4 {
            0 => self.write_intip(cfg, hart, irq, value),
            1 => self.write_intie(cfg, hart, irq, value),
            2 => self.write_intattr(cfg, hart, irq, value),
            _ => self.write_intctl(cfg, hart, irq, value),
        }
    }

    fn visible(&self, cfg: &ClicConfig, access: PrivMode, irq: usize) -> bool {
        mode::check_visible(
            access,
            cfg.supports_s(),
            cfg.supports_u(),
            self.nmbits,
            self.owner(cfg, irq),
        )
    }
}

fn inttrig_index(offset: usize) -> Option<usize> {
    let end = CLIC_INTTRIG_BASE + 4 * CLIC_INTTRIG_REGS;
    if (CLIC_INTTRIG_BASE..end).contains(&offset) {
        Some((offset - CLIC_INTTRIG_BASE) / 4)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, MockHart};
    use axaddrspace::GuestPhysAddr;

    const B: AccessWidth = AccessWidth::Byte;
    const L: AccessWidth = AccessWidth::Dword;
    const Q: AccessWidth = AccessWidth::Qword;

    fn msu_config() -> ClicConfig {
        let mut cfg = test_config();
        cfg.sclicbase = Some(GuestPhysAddr::from_usize(0xd000_1000));
        cfg.uclicbase = Some(GuestPhysAddr::from_usize(0xd000_2000));
        cfg
    }

    fn clicint(irq: usize) -> usize {
        CLIC_INTCTL_BASE + 4 * irq
    }

    #[test]
    fn cliccfg_is_filtered_per_mode() {
        let cfg = msu_config();
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);

        // reset: mnlbits=8, nmbits=2, snlbits=8, unlbits=8
        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, CLIC_CLICCFG, L), 0x0808_0028);
        // the S aperture sees only snlbits and unlbits
        assert_eq!(st.mmio_read(&cfg, PrivMode::Supervisor, CLIC_CLICCFG, L), 0x0808_0000);
        // the U aperture sees only unlbits
        assert_eq!(st.mmio_read(&cfg, PrivMode::User, CLIC_CLICCFG, L), 0x0800_0000);

        // S can set snlbits but not mnlbits or nmbits
        st.mmio_write(&cfg, &*hart, PrivMode::Supervisor, CLIC_CLICCFG, L, 0x0004_0013);
        assert_eq!(st.snlbits, 4);
        assert_eq!(st.mnlbits, 8);
        assert_eq!(st.nmbits, 2);

        // unlbits is writable from any aperture
        st.mmio_write(&cfg, &*hart, PrivMode::User, CLIC_CLICCFG, L, 0x0200_0000);
        assert_eq!(st.unlbits, 2);
    }

    #[test]
    fn cliccfg_warl_discards_out_of_range_fields() {
        let cfg = msu_config();
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);

        // mnlbits 10 and nmbits 3 are illegal and leave the stored values
        st.mmio_write(&cfg, &*hart, PrivMode::Machine, CLIC_CLICCFG, L, 0x0000_003a);
        assert_eq!(st.mnlbits, 8);
        assert_eq!(st.nmbits, 2);

        st.mmio_write(&cfg, &*hart, PrivMode::Machine, CLIC_CLICCFG, L, 0x0000_0024);
        assert_eq!(st.mnlbits, 4);
        assert_eq!(st.nmbits, 2);
    }

    #[test]
    fn nmbits_is_capped_by_supported_modes() {
        let cfg = test_config(); // machine only
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);
        assert_eq!(st.nmbits, 0);

        st.mmio_write(&cfg, &*hart, PrivMode::Machine, CLIC_CLICCFG, L, 0x38);
        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, CLIC_CLICCFG, L), 0x08);
    }

    #[test]
    fn inttrig_stores_masked_values() {
        let cfg = test_config();
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);

        let off = CLIC_INTTRIG_BASE + 4 * 3;
        st.mmio_write(&cfg, &*hart, PrivMode::Machine, off, L, 0xffff_e019);
        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, off, L), 0xc000_0019);

        // an interrupt number beyond the implemented sources drops the write
        st.mmio_write(&cfg, &*hart, PrivMode::Machine, off, L, 0x0000_1fff);
        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, off, L), 0xc000_0019);
    }

    #[test]
    fn mintthresh_is_v0_8_only() {
        let hart = MockHart::new();

        let mut cfg = test_config();
        cfg.version = Version::V0_8;
        let mut st = HartState::new(&cfg);
        st.mmio_write(&cfg, &*hart, PrivMode::Machine, CLIC_MINTTHRESH, L, 0xab);
        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, CLIC_MINTTHRESH, L), 0xab);

        let cfg = test_config();
        let mut st = HartState::new(&cfg);
        st.mmio_write(&cfg, &*hart, PrivMode::Machine, CLIC_MINTTHRESH, L, 0xab);
        assert_eq!(st.mintthresh, 0);
        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, CLIC_MINTTHRESH, L), 0);
    }

    #[test]
    fn unaligned_control_access_is_dropped() {
        let cfg = test_config();
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);

        st.mmio_write(&cfg, &*hart, PrivMode::Machine, CLIC_CLICCFG + 1, B, 0x4);
        assert_eq!(st.mnlbits, 8);
        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, CLIC_CLICCFG + 1, B), 0);
    }

    #[test]
    fn narrow_control_read_returns_low_bytes() {
        let cfg = test_config();
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);

        st.mmio_write(&cfg, &*hart, PrivMode::Machine, CLIC_CLICCFG, B, 0x04);
        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, CLIC_CLICCFG, B), 0x04);
    }

    #[test]
    fn wide_irq_access_decomposes_per_byte() {
        let cfg = test_config();
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);

        // one dword covers ip, ie, attr and ctl of a single interrupt
        st.mmio_write(&cfg, &*hart, PrivMode::Machine, clicint(12), L, 0x07c3_0100);
        assert_eq!(st.read_intie(12), 1);
        assert_eq!(st.read_intattr(&cfg, 12), 0xc3);
        assert_eq!(st.read_intctl(&cfg, 12), 0x1f);

        // a qword spans two interrupts
        let value = st.mmio_read(&cfg, PrivMode::Machine, clicint(12), Q);
        let lo = (value & 0xffff_ffff) as u32;
        let hi = (value >> 32) as u32;
        assert_eq!(lo, st.mmio_read(&cfg, PrivMode::Machine, clicint(12), L) as u32);
        assert_eq!(hi, st.mmio_read(&cfg, PrivMode::Machine, clicint(13), L) as u32);
    }

    #[test]
    fn out_of_range_irq_reads_zero() {
        let mut cfg = test_config();
        cfg.num_sources = 32;
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);

        assert_eq!(st.mmio_read(&cfg, PrivMode::Machine, clicint(32), L), 0);
        st.mmio_write(&cfg, &*hart, PrivMode::Machine, clicint(32) + 1, B, 1);
        assert_eq!(st.read_intie(31), 0);
    }

    #[test]
    fn machine_owned_irq_is_invisible_below_machine() {
        let cfg = msu_config();
        let hart = MockHart::new();
        let mut st = HartState::new(&cfg);

        // reset attributes are machine-owned
        assert_eq!(st.mmio_read(&cfg, PrivMode::Supervisor, clicint(12), L), 0);
        st.mmio_write(&cfg, &*hart, PrivMode::Supervisor, clicint(12), L, 0x5555_5555);
        let m_view = st.mmio_read(&cfg, PrivMode::Machine, clicint(12), L);
        assert_eq!(m_view, 0x1fc0_0000);

        // hand the interrupt to supervisor mode and it becomes visible
        st.mmio_write(&cfg, &*hart, PrivMode::Machine, clicint(12) + 2, B, 0x41);
        assert_ne!(st.mmio_read(&cfg, PrivMode::Supervisor, clicint(12), L), 0);
    }
}
