pub mod electricity_maps;
pub mod powercap;
pub mod system;
