//! Push buttons on interrupts, guarded by the watchdog.
//!
//! KEY0 kicks the watchdog. If it is not pressed for two seconds the
//! watchdog raises a warning interrupt, and resets the board two seconds
//! later.

#![no_std]
#![no_main]

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;
use de1soc::board::{self, irq};
use de1soc::cpu;
use de1soc::fpga_pio::FpgaPio;
use de1soc::hps_irq::{self, HpsIrq};
use de1soc::hps_watchdog::{self, Mode, Watchdog};
use de1soc::println;
use de1soc::rstmgr::{PeripheralReset, ResetManager};
use de1soc_macros::entrypoint;

/// Watchdog timeout.
const TIMEOUT_MS: u32 = 2000;

static KEYS: Mutex<RefCell<Option<FpgaPio>>> = Mutex::new(RefCell::new(None));

static WATCHDOG: Mutex<RefCell<Option<Watchdog>>> = Mutex::new(RefCell::new(None));

/// Number of key presses.
static PRESSES: AtomicU32 = AtomicU32::new(0);

fn key_handler(_id: u32) {
    critical_section::with(|cs| {
        let mut keys = KEYS.borrow_ref_mut(cs);
        let Some(keys) = keys.as_mut() else {
            return;
        };
        let edges = keys.edge_capture(0xf).unwrap_or(0);
        let _ = keys.clear_edge_capture(edges);
        PRESSES.fetch_add(edges.count_ones(), Ordering::Relaxed);

        if edges & 1 != 0 {
            if let Some(wdt) = WATCHDOG.borrow_ref_mut(cs).as_mut() {
                wdt.kick();
            }
        }
    });
}

fn watchdog_handler(_id: u32) {
    critical_section::with(|cs| {
        if let Some(wdt) = WATCHDOG.borrow_ref_mut(cs).as_mut() {
            wdt.clear_interrupt();
        }
    });
    println!("watchdog: press KEY0 or the board resets");
}

fn unhandled(id: u32) {
    println!("unhandled interrupt {}", id);
}

#[entrypoint]
fn main() {
    println!("de1soc irq_watchdog");

    let mut rstmgr = unsafe { ResetManager::new(board::RSTMGR_BASE) }.unwrap();
    rstmgr.release(PeripheralReset::L4Wd0);

    let mut wdt =
        unsafe { Watchdog::new(board::L4WD0_BASE, hps_watchdog::DEFAULT_CLOCK_HZ) }.unwrap();
    wdt.configure(TIMEOUT_MS, Mode::InterruptThenReset).unwrap();
    println!("watchdog timeout: {} ms", wdt.timeout_ms());

    let mut gic = unsafe { HpsIrq::new(board::GIC_DIST_BASE, board::GIC_CPU_BASE) }.unwrap();
    gic.register_handler(irq::FPGA_KEY, key_handler).unwrap();
    gic.register_handler(irq::L4WD0, watchdog_handler).unwrap();
    gic.set_unhandled_handler(Some(unhandled));
    hps_irq::install(gic).unwrap();

    let mut keys = unsafe { FpgaPio::new(board::KEY_BASE, board::KEY_CONFIG) }.unwrap();
    keys.set_interrupt_mask(true, 0xf).unwrap();

    wdt.enable();
    critical_section::with(|cs| {
        *KEYS.borrow_ref_mut(cs) = Some(keys);
        *WATCHDOG.borrow_ref_mut(cs) = Some(wdt);
    });

    cpu::irq_enable();

    let mut last = 0;
    loop {
        cpu::wfi();
        let presses = PRESSES.load(Ordering::Relaxed);
        if presses != last {
            println!("presses: {}", presses);
            last = presses;
        }
    }
}
