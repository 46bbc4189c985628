//! RISC-V CLIC (Core-Local Interrupt Controller) device model.
//!
//! One [`Clic`] serves a single hart and accepts up to 4096 interrupt lines.
//! The machine-mode register file is the only real state; supervisor and
//! user mode get [`ClicView`] apertures onto it that filter out interrupts
//! owned by a higher privilege. Enabled interrupts are kept in a sorted
//! active set so delivery is a single priority-ordered scan, and the winner
//! is posted to the hart as an encoded cause (irq, mode, level).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod bits;
mod consts;
mod mode;
mod regs;
mod state;

pub use bits::{decode_exccode, encode_exccode, Trigger};
pub use consts::*;
pub use mode::PrivMode;

use alloc::sync::Arc;
use alloc::vec::Vec;

use axaddrspace::{device::AccessWidth, GuestPhysAddr, GuestPhysAddrRange};
use axdevice_base::{BaseDeviceOps, EmuDeviceType};
use axerrno::{AxError, AxResult};
use log::warn;
use spin::Mutex;

use state::HartState;

/// CLIC specification revision implemented by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Legacy v0.8, which keeps `mintthresh` memory-mapped.
    V0_8,
    /// The 0.9-draft memory map.
    V0_9,
}

/// Interface to the hart served by a CLIC.
///
/// The controller queries the hart's current privilege and running interrupt
/// levels during arbitration and posts the winning interrupt back through
/// [`HartOps::raise_interrupt`]. All three methods are called with the
/// controller's lock held; implementations must not call back into the CLIC.
pub trait HartOps: Send + Sync {
    /// Current privilege mode of the hart.
    fn privilege(&self) -> PrivMode;

    /// Running interrupt level of the hart for `mode` (`mintstatus.xil`).
    fn interrupt_level(&self, mode: PrivMode) -> u8;

    /// Raise the interrupt line. `exccode` is the encoded cause, also
    /// readable out-of-band through [`Clic::exccode`] until the next
    /// delivery.
    fn raise_interrupt(&self, exccode: u32);
}

/// Construction parameters of a [`Clic`]. Immutable once the controller is
/// built.
#[derive(Debug, Clone)]
pub struct ClicConfig {
    /// Base of the machine-mode aperture in the guest physical address
    /// space. Must be 4 KiB-aligned.
    pub mclicbase: GuestPhysAddr,
    /// Base of the supervisor-mode aperture; `None` means S is unsupported.
    pub sclicbase: Option<GuestPhysAddr>,
    /// Base of the user-mode aperture; `None` means U is unsupported.
    pub uclicbase: Option<GuestPhysAddr>,
    /// The hart this controller serves.
    pub hartid: u32,
    /// Number of interrupt sources, at most [`CLIC_MAX_IRQ_COUNT`].
    pub num_sources: usize,
    /// Implemented bits in each `clicintctl` register, at most 8.
    pub clicintctlbits: u8,
    pub version: Version,
    /// Vector through a jump table instead of a handler-address table.
    pub jump_table: bool,
    /// Whether selective hardware vectoring is honored at all.
    pub shv_enabled: bool,
}

impl ClicConfig {
    pub fn supports_s(&self) -> bool {
        self.sclicbase.is_some()
    }

    pub fn supports_u(&self) -> bool {
        self.uclicbase.is_some()
    }
}

/// The core-local interrupt controller of one hart.
///
/// All mutable state sits behind one lock, acquired for every MMIO access,
/// line transition and arbitration pass.
pub struct Clic {
    cfg: ClicConfig,
    hart: Arc<dyn HartOps>,
    state: Mutex<HartState>,
}

impl Clic {
    /// Build a controller from explicit parameters.
    ///
    /// # Panics
    ///
    /// Panics on an illegal configuration (too many sources, too many
    /// control bits, unaligned aperture base): these are machine-wiring
    /// bugs, and a controller is never half-built.
    pub fn new(cfg: ClicConfig, hart: Arc<dyn HartOps>) -> Arc<Self> {
        assert!(
            cfg.num_sources <= CLIC_MAX_IRQ_COUNT,
            "clic supports at most {CLIC_MAX_IRQ_COUNT} interrupt sources"
        );
        assert!(
            cfg.clicintctlbits <= MAX_CLIC_INTCTLBITS,
            "clicintctlbits is at most {MAX_CLIC_INTCTLBITS}"
        );
        for base in [Some(cfg.mclicbase), cfg.sclicbase, cfg.uclicbase]
            .into_iter()
            .flatten()
        {
            assert_eq!(base.as_usize() & 0xfff, 0, "aperture base must be 4 KiB-aligned");
        }

        Arc::new(Self {
            state: Mutex::new(HartState::new(&cfg)),
            cfg,
            hart,
        })
    }

    /// Build a controller the way a machine description does: apertures by
    /// base address (`None` = mode absent) and the version as a string,
    /// `"v0.9"` or `"v0.9-jmp"`.
    ///
    /// # Panics
    ///
    /// Panics on an unknown version string or an illegal configuration.
    pub fn create(
        mclicbase: GuestPhysAddr,
        sclicbase: Option<GuestPhysAddr>,
        uclicbase: Option<GuestPhysAddr>,
        hartid: u32,
        num_sources: usize,
        clicintctlbits: u8,
        version: &str,
        hart: Arc<dyn HartOps>,
    ) -> Arc<Self> {
        let (base_version, jump_table) = match version.split_once('-') {
            Some((base, "jmp")) => (base, true),
            Some(_) => panic!("unknown clic version: {version}"),
            None => (version, false),
        };
        assert_eq!(base_version, "v0.9", "unknown clic version: {version}");

        Self::new(
            ClicConfig {
                mclicbase,
                sclicbase,
                uclicbase,
                hartid,
                num_sources,
                clicintctlbits,
                version: Version::V0_9,
                jump_table,
                shv_enabled: true,
            },
            hart,
        )
    }

    /// Allocate the MMIO apertures, one per supported privilege mode.
    pub fn views(self: &Arc<Self>) -> Vec<ClicView> {
        let mut views = Vec::with_capacity(3);
        views.push(ClicView {
            clic: self.clone(),
            access_mode: PrivMode::Machine,
            base: self.cfg.mclicbase,
        });
        if let Some(base) = self.cfg.sclicbase {
            views.push(ClicView {
                clic: self.clone(),
                access_mode: PrivMode::Supervisor,
                base,
            });
        }
        if let Some(base) = self.cfg.uclicbase {
            views.push(ClicView {
                clic: self.clone(),
                access_mode: PrivMode::User,
                base,
            });
        }
        views
    }

    /// Size of each aperture's MMIO region in bytes.
    pub fn region_size(&self) -> usize {
        CLIC_INTCTL_BASE + self.cfg.num_sources * 4
    }

    pub fn hartid(&self) -> u32 {
        self.cfg.hartid
    }

    pub fn num_sources(&self) -> usize {
        self.cfg.num_sources
    }

    /// Drive the external input line of `irq` to `level`.
    pub fn set_irq(&self, irq: usize, level: bool) {
        if irq >= self.cfg.num_sources {
            warn!("clic: line transition on invalid irq {irq}");
            return;
        }
        self.state
            .lock()
            .set_line(&self.cfg, &*self.hart, irq, level);
    }

    /// Re-run arbitration. The hart calls this after accepting an interrupt
    /// so a further pending interrupt can be posted.
    pub fn next_interrupt(&self) {
        self.state.lock().next_interrupt(&self.cfg, &*self.hart);
    }

    /// Encoded cause of the most recently posted interrupt.
    pub fn exccode(&self) -> u32 {
        self.state.lock().exccode
    }

    /// Clear the pending bit of `irq` without arbitrating, the manual path
    /// the hart uses when it accepts an unvectored edge-triggered interrupt.
    pub fn clean_pending(&self, irq: usize) {
        if irq >= self.cfg.num_sources {
            warn!("clic: pending clear on invalid irq {irq}");
            return;
        }
        self.state.lock().clean_pending(irq);
    }

    /// Whether `irq` is configured edge-triggered.
    pub fn is_edge_triggered(&self, irq: usize) -> bool {
        if irq >= self.cfg.num_sources {
            return false;
        }
        self.state.lock().trigger(irq).is_edge()
    }

    /// Whether `irq` uses selective hardware vectoring. Always false when
    /// vectoring is disabled controller-wide.
    pub fn is_shv_interrupt(&self, irq: usize) -> bool {
        if irq >= self.cfg.num_sources {
            return false;
        }
        self.state.lock().is_shv(&self.cfg, irq)
    }

    /// Whether vectored delivery goes through a jump table instead of a
    /// table of handler addresses.
    pub fn use_jump_table(&self) -> bool {
        self.cfg.jump_table
    }
}

/// One privilege mode's MMIO aperture onto a [`Clic`].
///
/// A view holds no register state of its own; it forwards every access to
/// the shared controller with its access mode attached, which is where
/// privilege and visibility filtering happen.
pub struct ClicView {
    /// The CLIC this is an aperture onto.
    clic: Arc<Clic>,
    /// Privilege mode whose filtered register file this aperture exposes.
    access_mode: PrivMode,
    /// Base of the aperture in the guest physical address space.
    base: GuestPhysAddr,
}

impl ClicView {
    pub fn access_mode(&self) -> PrivMode {
        self.access_mode
    }

    pub fn base(&self) -> GuestPhysAddr {
        self.base
    }

    /// The access is denied when the aperture belongs to a higher privilege
    /// than the hart currently runs in.
    fn check_privilege(&self, is_write: bool) -> bool {
        let current = self.clic.hart.privilege();
        if self.access_mode > current {
            warn!(
                "clic: invalid {} of {:?} registers in {:?} mode",
                if is_write { "write" } else { "read" },
                self.access_mode,
                current,
            );
            return false;
        }
        true
    }
}

impl BaseDeviceOps<GuestPhysAddrRange> for ClicView {
    fn emu_type(&self) -> EmuDeviceType {
        EmuDeviceType::InterruptController
    }

    fn address_range(&self) -> GuestPhysAddrRange {
        GuestPhysAddrRange::from_start_size(self.base, self.clic.region_size())
    }

    fn handle_read(
        &self,
        addr: <GuestPhysAddrRange as axaddrspace::device::DeviceAddrRange>::Addr,
        width: AccessWidth,
    ) -> AxResult<usize> {
        let offset = addr - self.base;
        if offset >= self.clic.region_size() {
            return Err(AxError::InvalidInput);
        }
        if !self.check_privilege(false) {
            return Ok(0);
        }
        let state = self.clic.state.lock();
        Ok(state.mmio_read(&self.clic.cfg, self.access_mode, offset, width) as usize)
    }

    fn handle_write(
        &self,
        addr: <GuestPhysAddrRange as axaddrspace::device::DeviceAddrRange>::Addr,
        width: AccessWidth,
        val: usize,
    ) -> AxResult {
        let offset = addr - self.base;
        if offset >= self.clic.region_size() {
            return Err(AxError::InvalidInput);
        }
        if !self.check_privilege(true) {
            return Ok(());
        }
        let mut state = self.clic.state.lock();
        state.mmio_write(
            &self.clic.cfg,
            &*self.clic.hart,
            self.access_mode,
            offset,
            width,
            val as u64,
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Scriptable hart for driving the controller in tests.
    pub(crate) struct MockHart {
        privilege: Mutex<PrivMode>,
        levels: Mutex<[u8; 4]>,
        raised: Mutex<Vec<u32>>,
    }

    impl MockHart {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                privilege: Mutex::new(PrivMode::Machine),
                levels: Mutex::new([0; 4]),
                raised: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn set_privilege(&self, mode: PrivMode) {
            *self.privilege.lock() = mode;
        }

        pub(crate) fn set_level(&self, mode: PrivMode, level: u8) {
            self.levels.lock()[mode.bits() as usize] = level;
        }

        pub(crate) fn last_raised(&self) -> Option<u32> {
            self.raised.lock().last().copied()
        }

        pub(crate) fn raised_count(&self) -> usize {
            self.raised.lock().len()
        }
    }

    impl HartOps for MockHart {
        fn privilege(&self) -> PrivMode {
            *self.privilege.lock()
        }

        fn interrupt_level(&self, mode: PrivMode) -> u8 {
            self.levels.lock()[mode.bits() as usize]
        }

        fn raise_interrupt(&self, exccode: u32) {
            self.raised.lock().push(exccode);
        }
    }

    pub(crate) const TEST_MBASE: usize = 0xd000_0000;

    /// Machine-only controller configuration the concrete scenarios run on.
    pub(crate) fn test_config() -> ClicConfig {
        ClicConfig {
            mclicbase: GuestPhysAddr::from_usize(TEST_MBASE),
            sclicbase: None,
            uclicbase: None,
            hartid: 0,
            num_sources: 4096,
            clicintctlbits: 3,
            version: Version::V0_9,
            jump_table: false,
            shv_enabled: true,
        }
    }
}
