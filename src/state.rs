//! Per-hart interrupt state: the register file, the sorted active set of
//! enabled interrupts and the delivery scan.

use alloc::vec;
use alloc::vec::Vec;

use crate::bits::{self, Trigger};
use crate::consts::*;
use crate::mode::{self, PrivMode};
use crate::{ClicConfig, HartOps};

/// One enabled interrupt, keyed for the delivery scan.
///
/// `intcfg` packs the interrupt's effective privilege mode above its raw
/// `clicintctl` byte so that a single integer comparison ranks mode, then
/// level+priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActiveInterrupt {
    pub(crate) intcfg: u16,
    pub(crate) irq: u16,
}

impl ActiveInterrupt {
    fn key(self) -> u32 {
        bits::encode_priority(self.intcfg, self.irq)
    }
}

/// The set of enabled interrupts, sorted by encoded priority descending.
///
/// Enablement changes are rare and delivery is hot, so sorting happens on
/// the configuration path and the delivery path is a single in-order scan.
pub(crate) struct ActiveSet {
    entries: Vec<ActiveInterrupt>,
}

impl ActiveSet {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, entry: ActiveInterrupt) {
        self.entries.push(entry);
        self.sort();
    }

    /// Remove the entry with this exact key. The key embeds the interrupt
    /// number, so at most one entry can match.
    pub(crate) fn remove(&mut self, entry: ActiveInterrupt) {
        let pos = self
            .entries
            .binary_search_by(|e| entry.key().cmp(&e.key()));
        debug_assert!(pos.is_ok(), "active set out of sync with intie");
        if let Ok(pos) = pos {
            self.entries.remove(pos);
        }
    }

    /// Replace the whole set. Used when a configuration change can move the
    /// effective mode of every interrupt at once.
    pub(crate) fn rebuild(&mut self, entries: impl Iterator<Item = ActiveInterrupt>) {
        self.entries.clear();
        self.entries.extend(entries);
        self.sort();
    }

    fn sort(&mut self) {
        self.entries.sort_unstable_by(|a, b| b.key().cmp(&a.key()));
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ActiveInterrupt> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The mutable register file of one CLIC, guarded by the device lock.
pub(crate) struct HartState {
    /// `cliccfg.nmbits`: how many `clicintattr.mode` bits are honored.
    pub(crate) nmbits: u8,
    /// `cliccfg.mnlbits`: level bits for M-mode interrupts.
    pub(crate) mnlbits: u8,
    /// `cliccfg.snlbits`: level bits for S-mode, zero when S is absent.
    pub(crate) snlbits: u8,
    /// `cliccfg.unlbits`: level bits for U-mode, zero when U is absent.
    pub(crate) unlbits: u8,
    /// `clicinttrig` registers. Storage only.
    pub(crate) inttrig: [u32; CLIC_INTTRIG_REGS],
    /// Per-interrupt pending bits, one byte each like the MMIO layout.
    intip: Vec<u8>,
    /// Per-interrupt enable bits.
    intie: Vec<u8>,
    /// Per-interrupt attribute bytes (mode, trigger, shv).
    intattr: Vec<u8>,
    /// Per-interrupt control bytes (level/priority), stored raw.
    intctl: Vec<u8>,
    /// Per-mode interrupt-level thresholds. Only `mintthresh` is
    /// memory-mapped, and only on v0.8.
    pub(crate) mintthresh: u32,
    pub(crate) sintthresh: u32,
    pub(crate) uintthresh: u32,
    /// Cause of the most recently posted interrupt, read out-of-band by the
    /// hart when it accepts.
    pub(crate) exccode: u32,
    active: ActiveSet,
}

impl HartState {
    pub(crate) fn new(cfg: &ClicConfig) -> Self {
        Self {
            nmbits: mode::max_nmbits(cfg.supports_s(), cfg.supports_u()),
            mnlbits: 8,
            snlbits: if cfg.supports_s() { 8 } else { 0 },
            unlbits: if cfg.supports_u() { 8 } else { 0 },
            inttrig: [0; CLIC_INTTRIG_REGS],
            intip: vec![0; cfg.num_sources],
            intie: vec![0; cfg.num_sources],
            // every interrupt is machine-owned out of reset
            intattr: vec![CLIC_INTATTR_MODE; cfg.num_sources],
            intctl: vec![0; cfg.num_sources],
            mintthresh: 0,
            sintthresh: 0,
            uintthresh: 0,
            exccode: 0,
            active: ActiveSet::with_capacity(cfg.num_sources),
        }
    }

    pub(crate) fn trigger(&self, irq: usize) -> Trigger {
        Trigger::from_attr(self.intattr[irq])
    }

    /// Effective privilege mode owning this interrupt.
    pub(crate) fn owner(&self, cfg: &ClicConfig, irq: usize) -> PrivMode {
        mode::stored_mode(
            self.nmbits,
            cfg.supports_s(),
            cfg.supports_u(),
            self.intattr[irq],
        )
    }

    pub(crate) fn is_shv(&self, cfg: &ClicConfig, irq: usize) -> bool {
        bits::attr_shv(self.intattr[irq]) && cfg.shv_enabled
    }

    fn intcfg_of(&self, cfg: &ClicConfig, irq: usize) -> u16 {
        (u16::from(self.owner(cfg, irq).bits()) << CLIC_INTCFG_MODE_SHIFT)
            | u16::from(self.intctl[irq])
    }

    fn active_entry(&self, cfg: &ClicConfig, irq: usize) -> ActiveInterrupt {
        ActiveInterrupt {
            intcfg: self.intcfg_of(cfg, irq),
            irq: irq as u16,
        }
    }

    // --- observable register values ---

    pub(crate) fn read_intip(&self, irq: usize) -> u8 {
        self.intip[irq]
    }

    pub(crate) fn read_intie(&self, irq: usize) -> u8 {
        self.intie[irq]
    }

    /// `clicintattr` with the reserved bits masked and the mode field
    /// replaced by the effective mode.
    pub(crate) fn read_intattr(&self, cfg: &ClicConfig, irq: usize) -> u8 {
        mode::attr_observable(
            self.nmbits,
            cfg.supports_s(),
            cfg.supports_u(),
            self.intattr[irq] & CLIC_INTATTR_MASK,
        )
    }

    pub(crate) fn read_intctl(&self, cfg: &ClicConfig, irq: usize) -> u8 {
        bits::intctl_read(self.intctl[irq], cfg.clicintctlbits)
    }

    // --- mutation, always followed by arbitration ---

    fn update_intip(&mut self, cfg: &ClicConfig, hart: &dyn HartOps, irq: usize, pending: bool) {
        self.intip[irq] = pending as u8;
        self.next_interrupt(cfg, hart);
    }

    /// Software write to `clicintip`. Pending bits of level-triggered
    /// interrupts track the input line and are read-only here.
    pub(crate) fn write_intip(&mut self, cfg: &ClicConfig, hart: &dyn HartOps, irq: usize, value: u8) {
        if !self.trigger(irq).is_edge() {
            return;
        }
        // zero means not pending, any non-zero value means pending
        let pending = value != 0;
        if pending != (self.intip[irq] != 0) {
            self.update_intip(cfg, hart, irq, pending);
        }
    }

    pub(crate) fn write_intie(&mut self, cfg: &ClicConfig, hart: &dyn HartOps, irq: usize, value: u8) {
        let enable = value != 0;
        if enable == (self.intie[irq] != 0) {
            return;
        }
        self.intie[irq] = enable as u8;
        let entry = self.active_entry(cfg, irq);
        if enable {
            self.active.insert(entry);
        } else {
            self.active.remove(entry);
        }
        self.next_interrupt(cfg, hart);
    }

    pub(crate) fn write_intattr(&mut self, cfg: &ClicConfig, hart: &dyn HartOps, irq: usize, value: u8) {
        let value = value & CLIC_INTATTR_MASK;
        let requested = bits::attr_mode_bits(value);
        let coerced = match mode::effective_mode(
            self.nmbits,
            cfg.supports_s(),
            cfg.supports_u(),
            requested,
        ) {
            Some(m) => m,
            // reserved encoding: the previously stored mode is retained
            None => self.owner(cfg, irq),
        };
        let value = bits::attr_set_mode(value, coerced.bits());
        // the mode field may only be set to a privilege level at or below
        // the hart's current one
        if hart.privilege() < coerced {
            return;
        }
        if value == self.intattr[irq] {
            return;
        }
        let enabled = self.intie[irq] != 0;
        if enabled {
            self.active.remove(self.active_entry(cfg, irq));
        }
        self.intattr[irq] = value;
        if enabled {
            self.active.insert(self.active_entry(cfg, irq));
        }
        self.next_interrupt(cfg, hart);
    }

    pub(crate) fn write_intctl(&mut self, cfg: &ClicConfig, hart: &dyn HartOps, irq: usize, value: u8) {
        if value == self.intctl[irq] {
            return;
        }
        let enabled = self.intie[irq] != 0;
        if enabled {
            self.active.remove(self.active_entry(cfg, irq));
        }
        self.intctl[irq] = value;
        if enabled {
            self.active.insert(self.active_entry(cfg, irq));
        }
        self.next_interrupt(cfg, hart);
    }

    /// Recompute every active-set entry after a `cliccfg.nmbits` change,
    /// which can move the effective mode of every interrupt at once.
    pub(crate) fn rebuild_active(&mut self, cfg: &ClicConfig) {
        let mut entries = Vec::new();
        for irq in 0..cfg.num_sources {
            if self.intie[irq] != 0 {
                entries.push(self.active_entry(cfg, irq));
            }
        }
        self.active.rebuild(entries.into_iter());
    }

    /// Translate an external line transition into a pending-bit update.
    ///
    /// Edge-triggered state lives in the pending bit; level-triggered state
    /// is the line itself (inverted for negative polarity), modeled by a
    /// pending bit that only this path may change.
    pub(crate) fn set_line(&mut self, cfg: &ClicConfig, hart: &dyn HartOps, irq: usize, level: bool) {
        match (self.trigger(irq), level) {
            (Trigger::PositiveLevel, _) => self.update_intip(cfg, hart, irq, level),
            (Trigger::PositiveEdge, true) => self.update_intip(cfg, hart, irq, true),
            (Trigger::PositiveEdge, false) => {}
            (Trigger::NegativeLevel, _) => self.update_intip(cfg, hart, irq, !level),
            (Trigger::NegativeEdge, false) => self.update_intip(cfg, hart, irq, true),
            (Trigger::NegativeEdge, true) => {}
        }
    }

    /// Direct pending clear, used by the hart for unvectored edge-triggered
    /// interrupts on accept. No arbitration side effect.
    pub(crate) fn clean_pending(&mut self, irq: usize) {
        self.intip[irq] = 0;
    }

    /// Scan the active set for the highest-ranked pending interrupt that can
    /// preempt the hart; post its cause and raise the interrupt line.
    pub(crate) fn next_interrupt(&mut self, cfg: &ClicConfig, hart: &dyn HartOps) {
        let hart_priv = hart.privilege();
        // interrupt-level floor per mode: the running level of the hart or
        // the mode's threshold, whichever is higher
        let floor = [
            hart.interrupt_level(PrivMode::User)
                .max((self.uintthresh & 0xff) as u8),
            hart.interrupt_level(PrivMode::Supervisor)
                .max((self.sintthresh & 0xff) as u8),
            0,
            hart.interrupt_level(PrivMode::Machine)
                .max((self.mintthresh & 0xff) as u8),
        ];

        let mut candidate = None;
        for entry in self.active.iter() {
            let (mode_bits, level, _priority) =
                bits::decode_intcfg(entry.intcfg, self.mnlbits, cfg.clicintctlbits);
            let Some(target) = PrivMode::from_bits(mode_bits) else {
                continue;
            };
            if target < hart_priv
                || (target == hart_priv && level < floor[target.bits() as usize])
            {
                // nothing further down can preempt
                break;
            }
            if self.intip[entry.irq as usize] != 0 {
                candidate = Some((entry.irq, target, level));
                break;
            }
        }

        if let Some((irq, target, level)) = candidate {
            // vectored edge-triggered pending is consumed at delivery
            if self.trigger(irq as usize).is_edge() && self.is_shv(cfg, irq as usize) {
                self.intip[irq as usize] = 0;
            }
            self.exccode = bits::encode_exccode(irq, target.bits(), level);
            hart.raise_interrupt(self.exccode);
        }
    }
}
