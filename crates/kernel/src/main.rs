#![no_std]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test::test_runner)]
#![reexport_test_harness_main = "kernel_testmain"]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(allocator_api)]
#![feature(pattern)]
#![feature(const_type_name)]
#![feature(box_vec_non_null)]
#![feature(vec_into_raw_parts)]
#![feature(iter_collect_into)]
#![feature(naked_functions)]
#![feature(sync_unsafe_cell)]
#![feature(never_type)]

#[cfg(test)]
mod test;

mod arch;
mod eve;
mod intr;
mod ipc;
mod limine;
mod logging;
mod memory;
mod mm;
mod process;
mod sched;
mod sync;
mod syscall;
mod utils;

extern crate alloc;
use arch::serial;

pub use memory::PhysAddr;
pub use memory::VirtAddr;

#[macro_export]
macro_rules! serial {
    ($($arg:tt)*) => {
        $crate::arch::serial::_serial(format_args!($($arg)*))
    };
}

/// Returns the number of milliseconds since the CPU was started
#[macro_export]
macro_rules! time {
    () => {
        $crate::arch::utils::time()
    };
}

#[unsafe(no_mangle)]
pub fn khalt() -> ! {
    loop {
        unsafe { arch::hlt() }
    }
}

#[allow(unused_imports)]
use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    unsafe {
        arch::disable_interrupts();
        arch::serial::SERIAL.force_unlock();
    }

    crate::panic_println!(
        "\x1B[38;2;255;0;0mkernel panic:\n{}, at {}\x1B[0m",
        info.message(),
        info.location().unwrap()
    );
    crate::serial!("{}", unsafe { logging::StackTrace::current() });

    #[cfg(test)]
    arch::power::shutdown();
    #[cfg(not(test))]
    khalt();
}

#[no_mangle]
extern "C" fn kstart() -> ! {
    arch::init_phase1();
    memory::sorcery::init_page_table();
    logging::BOOTING.store(true, core::sync::atomic::Ordering::Relaxed);
    arch::init_phase2();

    unsafe {
        crate::debug!("Eve starting...");
        logging::BOOTING.store(false, core::sync::atomic::Ordering::Relaxed);
        sched::boot(eve::main, eve::idle_function);
    }

    #[allow(unreachable_code)]
    {
        panic!("failed context switching to Eve! ...")
    }
}
