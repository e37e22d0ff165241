//! Eve is the kernel's main thread (PID 0, TID 0): it brings up the root
//! process bookkeeping and then idles, leaving everything else to threads
//! spawned over IPC/syscalls once userspace servers start registering ports.

use crate::serial;

/// The main loop of Eve. Runs until doomsday.
pub fn main() -> ! {
    *crate::logging::SERIAL_LOG.write() = Some(crate::utils::alloc::PageString::new());
    crate::info!("eve has been awaken ...");
    serial!("Hello, world!\n");

    #[cfg(test)]
    {
        fn run_tests(_tid: crate::sched::Tid, _arg: &()) -> ! {
            crate::kernel_testmain();
            unreachable!()
        }

        let kernel = crate::process::kernel_process();
        let context = unsafe {
            let mut page_table = kernel.page_table.lock();
            crate::arch::threading::CPUStatus::create_child(
                &mut page_table,
                crate::memory::VirtAddr::from(run_tests as usize),
                1,
                core::ptr::null(),
                false,
            )
            .expect("failed to set up the test thread's context")
        };
        crate::sched::thread_create(&kernel, crate::sched::thread::PRIORITY_HIGHEST, context);
    }

    loop {
        crate::sched::yield_now();
    }
}

pub fn idle_function() -> ! {
    crate::serial!("entered idle\n");
    loop {
        core::hint::spin_loop();
    }
}
