#[cfg(feature = "tracing")]
macro_rules! sim_event {
    ($level:ident, $($tt:tt)*) => {
        tracing::event!(target: "visible_adapter", tracing::Level::$level, $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! sim_event {
    ($level:ident, $($tt:tt)*) => {};
}

macro_rules! sim_trace {
    ($($tt:tt)*) => {
        sim_event!(TRACE, $($tt)*)
    };
}

macro_rules! sim_warn {
    ($($tt:tt)*) => {
        sim_event!(WARN, $($tt)*)
    };
}
