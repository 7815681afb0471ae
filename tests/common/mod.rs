pub(crate) mod builder;

pub(crate) mod logging;

pub(crate) mod oracles;

pub(crate) mod transport;
