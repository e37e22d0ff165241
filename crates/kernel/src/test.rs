use core::any::type_name;

use crate::{arch::power::shutdown, info};

#[macro_export]
macro_rules! test_log {
    ($($arg:tt)*) => {
        $crate::logln_ext!("test", "92", $($arg)*)
    };
}

macro_rules! ok {
    ($last_time_ms: expr) => {{
        let end_time_ms = $crate::time!();
        let delta_time_ms = end_time_ms - $last_time_ms;
        $crate::logln!(
            "[ \x1B[92m OK   \x1B[0m  ]\x1b[90m:\x1B[0m delta {}ms",
            delta_time_ms
        );
    }};
}

pub trait Testable {
    fn run(&self);
    #[inline(always)]
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
    #[inline(always)]
    fn piritory(&self) -> TestPiritory {
        get_test_piritory::<Self>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Represents the priority of a test.
pub enum TestPiritory {
    // crate::arch tests must be ran before other tests to ensure fail order
    Highest,
    // memory tests
    High,
    Medium,
    // tests that run last, given to this module tests
    Lowest,
}

const fn get_test_piritory<T: ?Sized>() -> TestPiritory {
    const {
        let name = type_name::<T>();
        if const_str::contains!(name, "test::") {
            TestPiritory::Lowest
        } else if const_str::contains!(name, "arch::") {
            TestPiritory::Highest
        } else if const_str::contains!(name, "memory::") {
            TestPiritory::High
        } else {
            TestPiritory::Medium
        }
    }
}

impl<T: Fn()> Testable for T {
    fn run(&self) {
        self();
    }
}

pub fn test_runner(tests: &[&dyn Testable]) -> ! {
    test_log!("running {} tests", tests.len());

    let tests_iter = tests
        .iter()
        .filter(|x| x.piritory() == TestPiritory::Highest);
    let tests_iter = tests_iter.chain(tests.iter().filter(|x| x.piritory() == TestPiritory::High));
    let tests_iter = tests_iter.chain(
        tests
            .iter()
            .filter(|x| x.piritory() == TestPiritory::Medium),
    );
    let tests_iter = tests_iter.chain(
        tests
            .iter()
            .filter(|x| x.piritory() == TestPiritory::Lowest),
    );

    let first_log_ms = crate::time!();

    for test in tests_iter {
        crate::arch::without_interrupts(|| {
            test_log!("running test \x1B[90m{}\x1B[0m...", test.name());
            let last_log = crate::time!();
            test.run();
            ok!(last_log);
        });
    }
    info!(
        "finished running tests in {}ms",
        crate::time!() - first_log_ms
    );

    // printing 'PLEASE EXIT' to the serial makes the test harness know the
    // kernel tests were successful
    info!("PLEASE EXIT, automatically attempting exiting, PLEASE EXIT");
    shutdown()
}
