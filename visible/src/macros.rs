// Every event goes to the `visible` target. Without the `tracing` feature the shims expand to
// nothing, so arguments must not carry side effects.

#[cfg(feature = "tracing")]
macro_rules! vevent {
    ($level:ident, $($tt:tt)*) => {
        tracing::event!(target: "visible", tracing::Level::$level, $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! vevent {
    ($level:ident, $($tt:tt)*) => {};
}

macro_rules! vtrace {
    ($($tt:tt)*) => {
        vevent!(TRACE, $($tt)*)
    };
}

macro_rules! vdebug {
    ($($tt:tt)*) => {
        vevent!(DEBUG, $($tt)*)
    };
}

macro_rules! vwarn {
    ($($tt:tt)*) => {
        vevent!(WARN, $($tt)*)
    };
}

macro_rules! verror {
    ($($tt:tt)*) => {
        vevent!(ERROR, $($tt)*)
    };
}
