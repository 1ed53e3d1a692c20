//! Driver for the HPS interrupt controller.
//!
//! The Cortex-A9 MPCore of the HPS includes an ARM Generic Interrupt
//! Controller (GIC) made of a distributor, shared by both cores, and one CPU
//! interface per core. This driver routes every shared peripheral interrupt
//! to CPU0 and dispatches them to the handlers registered in a fixed-size
//! table. For more information, please see the [ARM Generic Interrupt
//! Controller Architecture Specification] and the Interrupt Controller
//! section of the [Cyclone V Hard Processor System Technical Reference
//! Manual].
//!
//! [ARM Generic Interrupt Controller Architecture Specification]: https://developer.arm.com/documentation/ihi0048/b
//! [Cyclone V Hard Processor System Technical Reference Manual]: https://www.intel.com/content/www/us/en/docs/programmable/683126/current/cortex-a9-mpu-subsystem.html

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::FnvIndexMap;

use crate::bits;
use crate::cpu;
use crate::ctx::DriverCtx;
use crate::mmio::Mmio;
use crate::{Error, Result};

/// Base address of the distributor.
pub const DIST_BASE: usize = 0xfffe_d000;

/// Base address of the CPU interface.
pub const CPU_BASE: usize = 0xfffe_c100;

/// Distributor control register.
const ICDDCR: usize = 0x000;

/// Interrupt set-enable registers.
const ICDISER: usize = 0x100;

/// Interrupt clear-enable registers.
const ICDICER: usize = 0x180;

/// Interrupt set-pending registers.
const ICDISPR: usize = 0x200;

/// Interrupt clear-pending registers.
const ICDICPR: usize = 0x280;

/// Interrupt priority registers, one byte per ID.
const ICDIPR: usize = 0x400;

/// Interrupt processor targets registers, one byte per ID.
const ICDIPTR: usize = 0x800;

/// Interrupt configuration registers, two bits per ID.
const ICDICFR: usize = 0xc00;

/// Size of the distributor register block.
const DIST_SIZE: usize = 0x1000;

/// CPU interface control register.
const ICCICR: usize = 0x00;

/// Interrupt priority mask register.
const ICCPMR: usize = 0x04;

/// Binary point register.
const ICCBPR: usize = 0x08;

/// Interrupt acknowledge register.
const ICCIAR: usize = 0x0c;

/// End of interrupt register.
const ICCEOIR: usize = 0x10;

/// Size of the CPU interface register block.
const CPU_SIZE: usize = 0x100;

/// Number of interrupt IDs handled by the distributor.
pub const NUM_IDS: u32 = 256;

/// First shared peripheral interrupt. Lower IDs are banked per core.
const FIRST_SPI: u32 = 32;

/// Interrupt ID returned by ICCIAR when there is nothing to acknowledge.
pub const SPURIOUS_ID: u32 = 1023;

/// Maximum number of registered handlers.
pub const MAX_HANDLERS: usize = 64;

/// Priority given to every interrupt at initialization.
const DEFAULT_PRIORITY: u8 = 0xa0;

/// Interrupt handler. Receives the ID of the interrupt being handled.
pub type Handler = fn(u32);

/// Interrupt trigger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Level-sensitive.
    Level,

    /// Edge-triggered.
    Edge,
}

/// An acknowledged interrupt, waiting for its handler to run.
#[derive(Debug, Copy, Clone)]
pub struct Ack {
    /// Value read from ICCIAR. Written back to signal end of interrupt.
    iar: u32,

    /// Handler to run.
    handler: Option<Handler>,
}

impl Ack {
    /// Returns the interrupt ID.
    pub fn id(&self) -> u32 {
        bits::field(self.iar, 0, 10)
    }

    /// Runs the handler, if any.
    pub fn run(&self) {
        if let Some(handler) = self.handler {
            handler(self.id());
        }
    }
}

/// The HPS interrupt controller.
pub struct HpsIrq {
    /// Distributor.
    dist: DriverCtx,

    /// CPU interface.
    cpu: DriverCtx,

    /// Registered handlers, by interrupt ID.
    handlers: FnvIndexMap<u16, Handler, MAX_HANDLERS>,

    /// Handler for interrupts without a registered handler.
    unhandled: Option<Handler>,
}

/// Returns the word offset and bit of `id` in a one-bit-per-ID register
/// array.
fn bit_reg(id: u32) -> (usize, u32) {
    ((id / 32) as usize * 4, bits::bit(id % 32))
}

/// Returns the word offset and shift of `id` in a one-byte-per-ID register
/// array.
fn byte_reg(id: u32) -> (usize, u32) {
    ((id & !3) as usize, (id % 4) * 8)
}

/// Checks that `id` is handled by the distributor.
fn check_id(id: u32) -> Result<()> {
    if id >= NUM_IDS {
        return Err(Error::BeyondEnd(id as usize));
    }
    Ok(())
}

impl HpsIrq {
    /// Initializes the interrupt controller. Every shared peripheral
    /// interrupt is disabled, cleared, level-sensitive, targeted at CPU0 and
    /// given the default priority. IRQs are masked at the CPU while the
    /// controller is being reconfigured.
    ///
    /// # Safety
    ///
    /// `dist_base` and `cpu_base` must be the addresses of the GIC
    /// distributor and CPU interface.
    pub unsafe fn new(dist_base: usize, cpu_base: usize) -> Result<HpsIrq> {
        let dist = DriverCtx::claim(dist_base, DIST_SIZE)?;
        let cpu = DriverCtx::claim(cpu_base, CPU_SIZE)?;

        critical_section::with(|_| {
            let d = dist.regs();
            let c = cpu.regs();

            c.write(ICCICR, 0);
            d.write(ICDDCR, 0);

            for word in FIRST_SPI / 32..NUM_IDS / 32 {
                let reg = word as usize * 4;
                d.write(ICDICER + reg, u32::MAX);
                d.write(ICDICPR + reg, u32::MAX);
            }

            let prio = u32::from_ne_bytes([DEFAULT_PRIORITY; 4]);
            let target = u32::from_ne_bytes([1; 4]);
            for id in (FIRST_SPI..NUM_IDS).step_by(4) {
                let (reg, _) = byte_reg(id);
                d.write(ICDIPR + reg, prio);
                d.write(ICDIPTR + reg, target);
            }
            for id in (FIRST_SPI..NUM_IDS).step_by(16) {
                d.write(ICDICFR + (id / 16) as usize * 4, 0);
            }

            c.write(ICCPMR, 0xff);
            c.write(ICCBPR, 0);

            c.write(ICCICR, 1);
            d.write(ICDDCR, 1);
            cpu::dsb();
            cpu::isb();
        });

        Ok(HpsIrq {
            dist,
            cpu,
            handlers: FnvIndexMap::new(),
            unhandled: None,
        })
    }

    fn dist(&self) -> &Mmio {
        self.dist.regs()
    }

    /// Registers `handler` for interrupt `id` and enables it.
    pub fn register_handler(&mut self, id: u32, handler: Handler) -> Result<()> {
        check_id(id)?;

        critical_section::with(|_| {
            let key = id as u16;
            if self.handlers.contains_key(&key) {
                return Err(Error::InUse);
            }
            self.handlers
                .insert(key, handler)
                .map_err(|_| Error::NoSpace)?;
            Ok(())
        })?;

        self.set_enabled(id, true)
    }

    /// Disables interrupt `id` and removes its handler.
    pub fn unregister_handler(&mut self, id: u32) -> Result<()> {
        check_id(id)?;
        self.set_enabled(id, false)?;

        critical_section::with(|_| {
            self.handlers
                .remove(&(id as u16))
                .map(|_| ())
                .ok_or(Error::NotFound)
        })
    }

    /// Sets the handler called for interrupts without a registered handler.
    pub fn set_unhandled_handler(&mut self, handler: Option<Handler>) {
        critical_section::with(|_| self.unhandled = handler);
    }

    /// Enables or disables interrupt `id`.
    pub fn set_enabled(&mut self, id: u32, enable: bool) -> Result<()> {
        check_id(id)?;
        let (reg, bit) = bit_reg(id);
        let base = if enable { ICDISER } else { ICDICER };
        self.dist().write(base + reg, bit);
        Ok(())
    }

    /// Returns true if interrupt `id` is enabled.
    pub fn is_enabled(&self, id: u32) -> Result<bool> {
        check_id(id)?;
        let (reg, bit) = bit_reg(id);
        Ok(bits::check(self.dist().read(ICDISER + reg), bit))
    }

    /// Returns true if interrupt `id` is pending.
    pub fn is_pending(&self, id: u32) -> Result<bool> {
        check_id(id)?;
        let (reg, bit) = bit_reg(id);
        Ok(bits::check(self.dist().read(ICDISPR + reg), bit))
    }

    /// Clears the pending state of interrupt `id`.
    pub fn clear_pending(&mut self, id: u32) -> Result<()> {
        check_id(id)?;
        let (reg, bit) = bit_reg(id);
        self.dist().write(ICDICPR + reg, bit);
        Ok(())
    }

    /// Sets the priority of interrupt `id`. Lower values are more urgent.
    pub fn set_priority(&mut self, id: u32, priority: u8) -> Result<()> {
        check_id(id)?;
        let (reg, shift) = byte_reg(id);
        self.dist().modify(ICDIPR + reg, |val| {
            bits::insert(val, priority as u32, shift, 8)
        });
        Ok(())
    }

    /// Sets the trigger of interrupt `id`. Software generated interrupts
    /// (IDs below 16) are always edge-triggered.
    pub fn set_trigger(&mut self, id: u32, trigger: Trigger) -> Result<()> {
        check_id(id)?;
        if id < 16 {
            return Err(Error::NoSupport);
        }

        let reg = ICDICFR + (id / 16) as usize * 4;
        let edge = bits::bit((id % 16) * 2 + 1);
        match trigger {
            Trigger::Level => self.dist().clear_bits(reg, edge),
            Trigger::Edge => self.dist().set_bits(reg, edge),
        }
        Ok(())
    }

    /// Sets the CPUs (bit 0 = CPU0, bit 1 = CPU1) interrupt `id` is sent
    /// to. Only shared peripheral interrupts can be retargeted.
    pub fn set_target(&mut self, id: u32, cpus: u8) -> Result<()> {
        check_id(id)?;
        if id < FIRST_SPI {
            return Err(Error::NoSupport);
        }
        if cpus == 0 || cpus > 0b11 {
            return Err(Error::InvalidArg);
        }

        let (reg, shift) = byte_reg(id);
        self.dist().modify(ICDIPTR + reg, |val| {
            bits::insert(val, cpus as u32, shift, 8)
        });
        Ok(())
    }

    /// Acknowledges the highest priority pending interrupt. Returns `None`
    /// if the interrupt is spurious.
    pub fn acknowledge(&mut self) -> Option<Ack> {
        let iar = self.cpu.regs().read(ICCIAR);
        let id = bits::field(iar, 0, 10);
        if id == SPURIOUS_ID {
            return None;
        }

        let handler = self
            .handlers
            .get(&(id as u16))
            .copied()
            .or(self.unhandled);
        Some(Ack { iar, handler })
    }

    /// Signals the end of an interrupt returned by
    /// [`HpsIrq::acknowledge`].
    pub fn end_of_interrupt(&mut self, ack: Ack) {
        // The handler's register writes must land before the interrupt is
        // deactivated.
        cpu::dsb();
        self.cpu.regs().write(ICCEOIR, ack.iar);
    }

    /// Acknowledges the pending interrupt, runs its handler and signals the
    /// end of the interrupt. Returns the ID of the handled interrupt or
    /// `None` if it was spurious.
    pub fn dispatch(&mut self) -> Option<u32> {
        let ack = self.acknowledge()?;
        ack.run();
        self.end_of_interrupt(ack);
        Some(ack.id())
    }
}

impl Drop for HpsIrq {
    fn drop(&mut self) {
        self.cpu.regs().write(ICCICR, 0);
        self.dist().write(ICDDCR, 0);
    }
}

/// Interrupt controller used by [`irq_entry`].
static IRQ: Mutex<RefCell<Option<HpsIrq>>> = Mutex::new(RefCell::new(None));

/// Makes `irq` the interrupt controller used by the IRQ exception entry.
pub fn install(irq: HpsIrq) -> Result<()> {
    critical_section::with(|cs| {
        let mut slot = IRQ.borrow_ref_mut(cs);
        if slot.is_some() {
            return Err(Error::InUse);
        }
        *slot = Some(irq);
        Ok(())
    })
}

/// Removes the installed interrupt controller.
pub fn uninstall() -> Option<HpsIrq> {
    critical_section::with(|cs| IRQ.borrow_ref_mut(cs).take())
}

/// Runs `f` with the installed interrupt controller.
pub fn with_irq<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut HpsIrq) -> R,
{
    critical_section::with(|cs| {
        let mut slot = IRQ.borrow_ref_mut(cs);
        let irq = slot.as_mut().ok_or(Error::NoInit)?;
        Ok(f(irq))
    })
}

/// IRQ exception entry. Called by the IRQ vector with IRQs masked. The
/// handler runs with the controller released, so it may use [`with_irq`].
#[no_mangle]
pub extern "C" fn irq_entry() {
    let Ok(Some(ack)) = with_irq(|irq| irq.acknowledge()) else {
        return;
    };
    ack.run();
    let _ = with_irq(|irq| irq.end_of_interrupt(ack));
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::testing::RegBlock;

    struct Gic {
        dist: RegBlock,
        cpu: RegBlock,
    }

    impl Gic {
        fn new() -> Gic {
            Gic {
                dist: RegBlock::new(DIST_SIZE / 4),
                cpu: RegBlock::new(CPU_SIZE / 4),
            }
        }

        fn irq(&self) -> HpsIrq {
            unsafe { HpsIrq::new(self.dist.base(), self.cpu.base()) }.unwrap()
        }
    }

    #[test]
    fn init_routes_spis_to_cpu0() {
        let gic = Gic::new();
        let _irq = gic.irq();

        assert_eq!(gic.dist.read(ICDDCR), 1);
        assert_eq!(gic.cpu.read(ICCICR), 1);
        assert_eq!(gic.cpu.read(ICCPMR), 0xff);
        assert_eq!(gic.dist.read(ICDICER), 0);
        assert_eq!(gic.dist.read(ICDICER + 4), u32::MAX);
        assert_eq!(gic.dist.read(ICDICPR + 28), u32::MAX);
        assert_eq!(gic.dist.read(ICDIPR + 196), 0xa0a0_a0a0);
        assert_eq!(gic.dist.read(ICDIPTR + 252), 0x0101_0101);
        assert_eq!(gic.dist.read(ICDIPTR + 28), 0);
    }

    #[test]
    fn register_enables_id() {
        let gic = Gic::new();
        let mut irq = gic.irq();

        fn nop(_: u32) {}

        irq.register_handler(197, nop).unwrap();
        assert_eq!(gic.dist.read(ICDISER + 24), 1 << 5);
        assert_eq!(irq.register_handler(197, nop), Err(Error::InUse));
        assert_eq!(irq.register_handler(256, nop), Err(Error::BeyondEnd(256)));

        irq.unregister_handler(197).unwrap();
        assert_eq!(gic.dist.read(ICDICER + 24), 1 << 5);
        assert_eq!(irq.unregister_handler(197), Err(Error::NotFound));
    }

    #[test]
    fn handler_table_full() {
        let gic = Gic::new();
        let mut irq = gic.irq();

        fn nop(_: u32) {}

        for id in 0..MAX_HANDLERS as u32 {
            irq.register_handler(32 + id, nop).unwrap();
        }
        assert_eq!(irq.register_handler(200, nop), Err(Error::NoSpace));
    }

    #[test]
    fn per_id_configuration() {
        let gic = Gic::new();
        let mut irq = gic.irq();

        irq.set_priority(73, 0x10).unwrap();
        assert_eq!(gic.dist.read(ICDIPR + 72), 0xa0a0_10a0);

        irq.set_trigger(73, Trigger::Edge).unwrap();
        assert_eq!(gic.dist.read(ICDICFR + 16), 1 << 19);
        irq.set_trigger(73, Trigger::Level).unwrap();
        assert_eq!(gic.dist.read(ICDICFR + 16), 0);
        assert_eq!(irq.set_trigger(3, Trigger::Level), Err(Error::NoSupport));

        irq.set_target(73, 0b10).unwrap();
        assert_eq!(gic.dist.read(ICDIPTR + 72), 0x0101_0201);
        assert_eq!(irq.set_target(29, 1), Err(Error::NoSupport));
        assert_eq!(irq.set_target(73, 0), Err(Error::InvalidArg));

        gic.dist.write(ICDISPR + 8, 1 << 9);
        assert!(irq.is_pending(73).unwrap());
        irq.clear_pending(73).unwrap();
        assert_eq!(gic.dist.read(ICDICPR + 8), 1 << 9);
    }

    static LAST_HANDLED: AtomicU32 = AtomicU32::new(0);
    static LAST_UNHANDLED: AtomicU32 = AtomicU32::new(0);

    #[test]
    fn dispatch_runs_handlers() {
        let gic = Gic::new();
        let mut irq = gic.irq();

        fn handler(id: u32) {
            LAST_HANDLED.store(id, Ordering::SeqCst);
        }
        fn unhandled(id: u32) {
            LAST_UNHANDLED.store(id, Ordering::SeqCst);
        }

        irq.register_handler(80, handler).unwrap();
        irq.set_unhandled_handler(Some(unhandled));

        gic.cpu.write(ICCIAR, 80);
        assert_eq!(irq.dispatch(), Some(80));
        assert_eq!(LAST_HANDLED.load(Ordering::SeqCst), 80);
        assert_eq!(gic.cpu.read(ICCEOIR), 80);

        gic.cpu.write(ICCIAR, 81);
        assert_eq!(irq.dispatch(), Some(81));
        assert_eq!(LAST_UNHANDLED.load(Ordering::SeqCst), 81);

        gic.cpu.write(ICCIAR, SPURIOUS_ID);
        assert_eq!(irq.dispatch(), None);
        assert_eq!(gic.cpu.read(ICCEOIR), 81);
    }

    static ENTRY_HANDLED: AtomicU32 = AtomicU32::new(0);

    #[test]
    fn exception_entry_uses_installed_controller() {
        let gic = Gic::new();

        fn handler(id: u32) {
            // The controller is reachable from the handler.
            with_irq(|irq| irq.clear_pending(id)).unwrap().unwrap();
            ENTRY_HANDLED.store(id, Ordering::SeqCst);
        }

        irq_entry();
        assert_eq!(ENTRY_HANDLED.load(Ordering::SeqCst), 0);

        let mut irq = gic.irq();
        irq.register_handler(199, handler).unwrap();
        install(irq).unwrap();
        let other = Gic::new();
        assert!(matches!(install(other.irq()), Err(Error::InUse)));

        gic.cpu.write(ICCIAR, 199);
        irq_entry();
        assert_eq!(ENTRY_HANDLED.load(Ordering::SeqCst), 199);
        assert_eq!(gic.cpu.read(ICCEOIR), 199);
        assert_eq!(gic.dist.read(ICDICPR + 24), 1 << 7);

        drop(uninstall());
    }
}
