//! Hardware drivers for sdmem
//!
//! `sdhci` covers the SDIO host peripheral, `sdmem` the memory card protocol
//! running on top of it.

pub mod sdhci;
pub mod sdmem;
