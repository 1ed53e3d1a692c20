//! DE1-SoC memory map and wiring.
//!
//! The FPGA addresses are the ones of the DE1-SoC Computer system, where
//! every core hangs off the lightweight HPS-to-FPGA bridge at 0xff200000.
//! The HPS addresses come from the [Cyclone V Hard Processor System
//! Technical Reference Manual].
//!
//! [Cyclone V Hard Processor System Technical Reference Manual]: https://www.intel.com/content/www/us/en/docs/programmable/683126/current/hard-processor-system-technical-reference.html

use crate::fpga_pio::{PioConfig, PioKind};
use crate::hps_gpio::Bank;
use crate::lt24::Lt24Pins;

/// Base address of the lightweight HPS-to-FPGA bridge.
pub const LW_BRIDGE_BASE: usize = 0xff20_0000;

/// Red LEDs.
pub const LEDR_BASE: usize = 0xff20_0000;

/// Seven-segment displays HEX3 to HEX0.
pub const HEX3_HEX0_BASE: usize = 0xff20_0020;

/// Seven-segment displays HEX5 and HEX4.
pub const HEX5_HEX4_BASE: usize = 0xff20_0030;

/// Slide switches.
pub const SW_BASE: usize = 0xff20_0040;

/// Push buttons.
pub const KEY_BASE: usize = 0xff20_0050;

/// GPIO expansion header JP1.
pub const JP1_BASE: usize = 0xff20_0060;

/// LT24 hardware-optimized interface.
pub const LT24_BASE: usize = 0xff20_0080;

/// Servo PWM controller.
pub const SERVO_BASE: usize = 0xff20_00c0;

/// Mandelbrot generator.
pub const MANDELBROT_BASE: usize = 0xff20_0100;

/// JTAG UART.
pub const JTAG_UART_BASE: usize = 0xff20_1000;

/// Audio FIFO core.
pub const AUDIO_BASE: usize = 0xff20_3040;

/// HPS GPIO controllers.
pub const HPS_GPIO0_BASE: usize = Bank::Gpio0.base();
pub const HPS_GPIO1_BASE: usize = Bank::Gpio1.base();
pub const HPS_GPIO2_BASE: usize = Bank::Gpio2.base();

/// HPS I2C controllers. I2C0 reaches the audio codec, the ADXL345
/// accelerometer and the video decoder through the I2C mux.
pub const HPS_I2C0_BASE: usize = 0xffc0_4000;
pub const HPS_I2C1_BASE: usize = 0xffc0_5000;
pub const HPS_I2C2_BASE: usize = 0xffc0_6000;
pub const HPS_I2C3_BASE: usize = 0xffc0_7000;

/// GIC distributor.
pub const GIC_DIST_BASE: usize = crate::hps_irq::DIST_BASE;

/// GIC CPU interface.
pub const GIC_CPU_BASE: usize = crate::hps_irq::CPU_BASE;

/// Cortex-A9 private timer.
pub const PRIVATE_TIMER_BASE: usize = crate::hps_usleep::PRIVATE_TIMER_BASE;

/// L4 watchdogs.
pub const L4WD0_BASE: usize = 0xffd0_2000;
pub const L4WD1_BASE: usize = 0xffd0_3000;

/// Reset manager.
pub const RSTMGR_BASE: usize = crate::rstmgr::RSTMGR_BASE;

/// SD/MMC controller.
pub const SDMMC_BASE: usize = crate::sdmmc::SDMMC_BASE;

/// GIC interrupt IDs.
pub mod irq {
    /// Cortex-A9 private timer.
    pub const PRIVATE_TIMER: u32 = 29;

    /// FPGA interval timer.
    pub const FPGA_TIMER: u32 = 72;

    /// FPGA push buttons.
    pub const FPGA_KEY: u32 = 73;

    /// FPGA audio core.
    pub const FPGA_AUDIO: u32 = 78;

    /// FPGA JTAG UART.
    pub const FPGA_JTAG_UART: u32 = 80;

    /// FPGA expansion header JP1.
    pub const FPGA_JP1: u32 = 83;

    /// HPS SD/MMC controller.
    pub const SDMMC: u32 = 171;

    /// HPS I2C controllers.
    pub const I2C0: u32 = 190;
    pub const I2C1: u32 = 191;

    /// HPS GPIO controllers.
    pub const GPIO0: u32 = 196;
    pub const GPIO1: u32 = 197;
    pub const GPIO2: u32 = 198;

    /// L4 watchdogs.
    pub const L4WD0: u32 = 203;
    pub const L4WD1: u32 = 204;
}

/// HPS GPIO bank of the user LED, the user key and the I2C mux line.
pub const HPS_PINS_BANK: Bank = Bank::Gpio1;

/// HPS user LED (HPS_LED, GPIO53).
pub const HPS_LED_PIN: u32 = 1 << 24;

/// HPS user key (HPS_KEY, GPIO54). Reads 0 while pressed.
pub const HPS_KEY_PIN: u32 = 1 << 25;

/// I2C mux select (HPS_I2C_CONTROL, GPIO48). Driven high, I2C0 reaches
/// the on-board peripherals; low, it is routed to the FPGA.
pub const HPS_I2C_MUX_PIN: u32 = 1 << 19;

/// Red LEDs: 10 outputs.
pub const LEDR_CONFIG: PioConfig = PioConfig::new(PioKind::Output, 10);

/// Slide switches: 10 inputs.
pub const SW_CONFIG: PioConfig = PioConfig::new(PioKind::Input, 10);

/// Push buttons: 4 inputs with edge capture and interrupts.
pub const KEY_CONFIG: PioConfig = PioConfig::new(PioKind::Input, 4).with_irq();

/// HEX3 to HEX0: one byte per display, segment 0 in bit 0.
pub const HEX3_HEX0_CONFIG: PioConfig = PioConfig::new(PioKind::Output, 32);

/// HEX5 and HEX4.
pub const HEX5_HEX4_CONFIG: PioConfig = PioConfig::new(PioKind::Output, 16);

/// JP1: 32 bidirectional lines with interrupts.
pub const JP1_CONFIG: PioConfig = PioConfig::new(PioKind::Bidir, 32).with_irq();

/// LT24 control lines on JP1.
pub const LT24_PINS: Lt24Pins = Lt24Pins {
    reset_n: 1 << 0,
    lcd_on: 1 << 1,
    hw_mode: 1 << 2,
};

/// Seven-segment encodings of the hexadecimal digits.
pub const SEVEN_SEGMENT: [u8; 16] = [
    0x3f, 0x06, 0x5b, 0x4f, 0x66, 0x6d, 0x7d, 0x07, 0x7f, 0x6f, 0x77, 0x7c,
    0x39, 0x5e, 0x79, 0x71,
];

/// Returns the HEX3-HEX0 register value showing the low 16 bits of
/// `value` in hexadecimal.
pub fn hex_digits(value: u32) -> u32 {
    (0..4).fold(0, |reg, i| {
        let digit = (value >> (4 * i)) & 0xf;
        reg | ((SEVEN_SEGMENT[digit as usize] as u32) << (8 * i))
    })
}
