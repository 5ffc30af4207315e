pub(crate) mod refillable_wrapper;

pub(crate) use refillable_wrapper::*;
