//! CPU specific operations.
//!
//! The HPS contains two ARM Cortex-A9 cores. Only the first one is used by
//! this crate. On other architectures (e.g. when running the host tests)
//! these operations do nothing.

#[cfg(target_arch = "arm")]
use core::arch::asm;

/// CPSR: IRQ mask bit.
#[cfg(target_arch = "arm")]
const CPSR_I: u32 = 1 << 7;

/// Reads the CPSR.
#[cfg(target_arch = "arm")]
#[inline(always)]
fn cpsr() -> u32 {
    let cpsr: u32;
    unsafe { asm!("mrs {}, cpsr", out(reg) cpsr, options(nomem, nostack)) };
    cpsr
}

/// Masks IRQs.
#[inline(always)]
pub fn irq_disable() {
    #[cfg(target_arch = "arm")]
    unsafe {
        asm!("cpsid i", options(nostack))
    };
}

/// Unmasks IRQs.
#[inline(always)]
pub fn irq_enable() {
    #[cfg(target_arch = "arm")]
    unsafe {
        asm!("cpsie i", options(nostack))
    };
}

/// Returns true if IRQs are unmasked.
#[inline(always)]
pub fn irqs_enabled() -> bool {
    #[cfg(target_arch = "arm")]
    {
        cpsr() & CPSR_I == 0
    }
    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}

/// Masks IRQs and returns whether they were unmasked before.
#[inline(always)]
pub fn irq_save() -> bool {
    let enabled = irqs_enabled();
    irq_disable();
    enabled
}

/// Unmasks IRQs if `enabled`, the value returned by [`irq_save`].
#[inline(always)]
pub fn irq_restore(enabled: bool) {
    if enabled {
        irq_enable();
    }
}

/// wfi instruction.
///
/// Wait For Interrupt suspends execution until an interrupt or a debug
/// event occurs.
#[inline(always)]
pub fn wfi() {
    #[cfg(target_arch = "arm")]
    unsafe {
        asm!("wfi", options(nomem, nostack))
    };
}

/// Data Synchronization Barrier.
#[inline(always)]
pub fn dsb() {
    #[cfg(target_arch = "arm")]
    unsafe {
        asm!("dsb", options(nostack))
    };
}

/// Instruction Synchronization Barrier.
#[inline(always)]
pub fn isb() {
    #[cfg(target_arch = "arm")]
    unsafe {
        asm!("isb", options(nostack))
    };
}

/// Single-core `critical-section` implementation masking IRQs.
#[cfg(all(feature = "critical-section-impl", target_arch = "arm"))]
mod single_core {
    use critical_section::RawRestoreState;

    struct SingleCoreCriticalSection;
    critical_section::set_impl!(SingleCoreCriticalSection);

    unsafe impl critical_section::Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            super::irq_save()
        }

        unsafe fn release(enabled: RawRestoreState) {
            super::irq_restore(enabled)
        }
    }
}
