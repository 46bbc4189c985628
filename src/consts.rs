// Follows the CLIC memory map of the 0.9-draft specification (20 June 2023):
// a 4 KiB control region followed by four byte-wide registers per interrupt.

/// Start offset of the per-interrupt `clicint*` registers within a view.
/// Everything below this offset is the control region.
pub const CLIC_INTCTL_BASE: usize = 0x1000;

/// Maximum number of implemented bits in each `clicintctl[i]` register.
pub const MAX_CLIC_INTCTLBITS: u8 = 8;

/// Interrupt numbers are 12 bits wide, giving a maximum of 4096 sources.
pub const CLIC_IRQ_BITS: u32 = 12;

/// Maximum number of interrupt sources per CLIC.
pub const CLIC_MAX_IRQ_COUNT: usize = 1 << CLIC_IRQ_BITS;

/// Mask selecting an interrupt number.
pub const CLIC_IRQ_MASK: u32 = (CLIC_MAX_IRQ_COUNT - 1) as u32;

// --- Control region offsets (relative to the view base) ---

/// Offset of the `cliccfg` register.
pub const CLIC_CLICCFG: usize = 0x00;

/// Offset of the `mintthresh` register (memory-mapped on v0.8 only).
pub const CLIC_MINTTHRESH: usize = 0x08;

/// Offset of `clicinttrig[0]`. Register n lives at `CLIC_INTTRIG_BASE + n*4`.
pub const CLIC_INTTRIG_BASE: usize = 0x40;

/// Number of `clicinttrig` registers.
pub const CLIC_INTTRIG_REGS: usize = 32;

// --- cliccfg field layout ---
//
// 31:28    reserved (WPRI 0)
// 27:24    unlbits
// 23:20    reserved (WPRI 0)
// 19:16    snlbits
// 15:6     reserved (WPRI 0)
//  5:4     nmbits
//  3:0     mnlbits

pub const CLICCFG_MNLBITS_SHIFT: u32 = 0;
pub const CLICCFG_MNLBITS_MASK: u32 = 0xf;
pub const CLICCFG_NMBITS_SHIFT: u32 = 4;
pub const CLICCFG_NMBITS_MASK: u32 = 0x3;
pub const CLICCFG_SNLBITS_SHIFT: u32 = 16;
pub const CLICCFG_SNLBITS_MASK: u32 = 0xf;
pub const CLICCFG_UNLBITS_SHIFT: u32 = 24;
pub const CLICCFG_UNLBITS_MASK: u32 = 0xf;

// --- clicinttrig field layout ---
//
// 31       interrupt_trap_enable
// 30       nxti_enable
// 29:13    reserved (WARL 0)
// 12:0     interrupt_number

pub const CLIC_INTTRIG_TRAP_ENA: u32 = 0x8000_0000;
pub const CLIC_INTTRIG_NXTI_ENA: u32 = 0x4000_0000;
pub const CLIC_INTTRIG_IRQN: u32 = 0x0000_1fff;
pub const CLIC_INTTRIG_MASK: u32 =
    CLIC_INTTRIG_TRAP_ENA | CLIC_INTTRIG_NXTI_ENA | CLIC_INTTRIG_IRQN;

// --- clicintattr field layout ---
//
// 7:6      mode
// 5:3      reserved (WPRI 0)
// 2:1      trig
// 0        shv

pub const CLIC_INTATTR_MODE_SHIFT: u32 = 6;
pub const CLIC_INTATTR_MODE: u8 = 0xc0;
pub const CLIC_INTATTR_TRIG_SHIFT: u32 = 1;
pub const CLIC_INTATTR_TRIG: u8 = 0x06;
pub const CLIC_INTATTR_SHV: u8 = 0x01;
pub const CLIC_INTATTR_MASK: u8 = CLIC_INTATTR_MODE | CLIC_INTATTR_TRIG | CLIC_INTATTR_SHV;

/// `trig` bit 0: edge-triggered when set, level-triggered when clear.
pub const CLIC_INTATTR_TRIG_EDGE: u8 = 0b01;
/// `trig` bit 1: negative polarity when set.
pub const CLIC_INTATTR_TRIG_INV: u8 = 0b10;

// --- active-set key layout ---
//
// The mode and intctl of an enabled interrupt combine into a single sortable
// `intcfg` value so that higher modes order first:
// 9:8      privilege mode
// 7:0      clicintctl

pub const CLIC_INTCFG_MODE_SHIFT: u32 = 8;
pub const CLIC_INTCFG_MASK: u16 = 0x3ff;

// --- exccode layout ---
//
// The cause posted to the hart packs the interrupt number, the privilege
// mode it targets and its interrupt level:
// 21:14    level
// 13:12    mode
// 11:0     irq

pub const CLIC_EXCCODE_MODE_SHIFT: u32 = 12;
pub const CLIC_EXCCODE_MODE_MASK: u32 = 0x3;
pub const CLIC_EXCCODE_LEVEL_SHIFT: u32 = 14;
pub const CLIC_EXCCODE_LEVEL_MASK: u32 = 0xff;
