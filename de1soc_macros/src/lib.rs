//! Macros that generate low-level boilerplate code.
//!
//! de1soc programs run bare-metal on CPU0 of the Cortex-A9 MPCore, in SVC
//! mode, loaded into DDR by the preloader or a debugger. Thus, the macros are
//! limited to this use case.

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Reset code, exception vector table and exception stubs.
///
/// Braces are doubled because the string is passed to `global_asm!`.
const START_CODE: &str = r#"
    .section .vectors, "ax"
    .arm
    .balign 32
    .global _de1soc_vectors
_de1soc_vectors:
    b _start
    b _de1soc_undef
    b _de1soc_svc
    b _de1soc_pabort
    b _de1soc_dabort
    b .
    b _de1soc_irq
    b _de1soc_fiq

_de1soc_undef:
    mov r0, #1
    b _de1soc_exception
_de1soc_svc:
    mov r0, #2
    b _de1soc_exception
_de1soc_pabort:
    mov r0, #3
    b _de1soc_exception
_de1soc_dabort:
    mov r0, #4
    b _de1soc_exception
_de1soc_fiq:
    mov r0, #5
    b _de1soc_exception

_de1soc_irq:
    sub lr, lr, #4
    stmfd sp!, {{r0-r3, r12, lr}}
    bl irq_entry
    ldmfd sp!, {{r0-r3, r12, pc}}^

    .section .text.start, "ax"
    .arm
    .global _start
_start:
    // One stack per exception mode. IRQs and FIQs stay masked.
    cps #0x12
    ldr sp, =__irq_stack_top
    cps #0x11
    ldr sp, =__fiq_stack_top
    cps #0x17
    ldr sp, =__abt_stack_top
    cps #0x1b
    ldr sp, =__und_stack_top
    cps #0x13
    ldr sp, =__svc_stack_top

    // Zero .bss.
    ldr r0, =__bss_start
    ldr r1, =__bss_end
    mov r2, #0
1:
    cmp r0, r1
    strlo r2, [r0], #4
    blo 1b

    // Vector base address.
    ldr r0, =_de1soc_vectors
    mcr p15, 0, r0, c12, c0, 0
    isb

    bl _de1soc_main

2:
    wfi
    b 2b

    .text
"#;

/// Generates the boilerplate required to call the provided function on boot.
///
/// The function must take no arguments. The generated code provides:
///
/// - `_start`, which sets up the stacks of the IRQ, FIQ, abort, undefined
///   and SVC modes, zeroes `.bss`, points VBAR at the vector table and calls
///   the function in SVC mode with interrupts masked.
/// - The exception vector table. IRQs are routed to
///   `de1soc::hps_irq::irq_entry`. Any other exception panics.
/// - A panic handler that prints the panic over the JTAG UART.
///
/// If the function returns, the CPU waits for interrupts forever.
///
/// The linker script must provide the `.vectors` and `.text.start`
/// sections and the `__bss_start`, `__bss_end` and `__*_stack_top`
/// symbols. The following example shows how to pass it using a Cargo
/// configuration file.
///
/// ```text
/// [target.armv7a-none-eabi]
/// rustflags = ["-Clink-arg=-Tde1soc.ld"]
/// ```
#[proc_macro_attribute]
pub fn entrypoint(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item_fn = parse_macro_input!(item as ItemFn);

    if !item_fn.sig.inputs.is_empty() {
        return syn::Error::new_spanned(
            &item_fn.sig.inputs,
            "the entrypoint must not take arguments",
        )
        .to_compile_error()
        .into();
    }

    let fname_rust = &item_fn.sig.ident;

    let tokens = quote! {
        core::arch::global_asm!(#START_CODE);

        #[no_mangle]
        extern "C" fn _de1soc_main() {
            #fname_rust();
        }

        #[no_mangle]
        extern "C" fn _de1soc_exception(kind: u32) -> ! {
            let name = match kind {
                1 => "undefined instruction",
                2 => "supervisor call",
                3 => "prefetch abort",
                4 => "data abort",
                5 => "FIQ",
                _ => "unknown",
            };
            panic!("unexpected exception: {}", name);
        }

        #[panic_handler]
        fn panic(info: &core::panic::PanicInfo) -> ! {
            de1soc::cpu::irq_disable();

            de1soc::print!("\n\n!!! PANIC !!!\n\n");

            if let Some(location) = info.location() {
                de1soc::print!("{}:{}", location.file(), location.line());
            }

            de1soc::println!(": {}", info.message());

            loop {
                de1soc::cpu::wfi();
            }
        }

        #item_fn
    };

    tokens.into()
}
