use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Copy, Clone, PartialEq, PartialOrd)]
pub enum LogLevel {
    Error = 0,
    Info,
    Debug,
    Trace,
}

static LEVEL: AtomicUsize = AtomicUsize::new(LogLevel::Info as usize);

pub fn log_init(level: LogLevel) {
    LEVEL.store(level as usize, Ordering::Relaxed);
}

pub fn enabled(level: LogLevel) -> bool {
    level as usize <= LEVEL.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! trace(
    ($fmt:expr) => {
        log!($crate::log::LogLevel::Trace, $fmt)
    };
    ($fmt:expr, $($arg:tt)*) => {
        log!($crate::log::LogLevel::Trace, $fmt, $($arg)*)
    };
);

#[macro_export]
macro_rules! debug(
    ($fmt:expr) => {
        log!($crate::log::LogLevel::Debug, $fmt)
    };
    ($fmt:expr, $($args:tt)*) => {
        log!($crate::log::LogLevel::Debug, $fmt, $($args)*)
    };
);

#[macro_export]
macro_rules! info(
    ($fmt:expr) => {
        log!($crate::log::LogLevel::Info, $fmt)
    };
    ($fmt:expr, $($arg:tt)*) => {
        log!($crate::log::LogLevel::Info, $fmt, $($arg)*)
    };
);

#[macro_export]
macro_rules! error(
    ($fmt:expr) => {
        log!($crate::log::LogLevel::Error, $fmt)
    };
    ($fmt:expr, $($args:tt)*) => {
        log!($crate::log::LogLevel::Error, $fmt, $($args)*)
    };
);

#[macro_export]
macro_rules! log(
    ($level:expr, $fmt:expr) => {
        {
            use std::io::Write;
            use chrono::Local;
            if $crate::log::enabled($level) {
                let stderr = ::std::io::stderr();
                let mut handle = stderr.lock();
                writeln!(
                    &mut handle,
                    concat!("{} - [{}:{}] ", $fmt),
                    Local::now().format("%x %X"),
                    file!(),
                    line!()
                )
                .ok();
            }
        }
    };

    ($level:expr, $fmt:expr, $($arg:tt)*) => {
        {
            use std::io::Write;
            use chrono::Local;
            if $crate::log::enabled($level) {
                let stderr = ::std::io::stderr();
                let mut handle = stderr.lock();
                writeln!(
                    &mut handle,
                    concat!("{} - [{}:{}] ", $fmt),
                    Local::now().format("%x %X"),
                    file!(),
                    line!(),
                    $($arg)*
                )
                .ok();
            }
        }
    };
);
