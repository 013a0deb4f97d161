// FAT building blocks shared by the virtual disk engine

pub mod constants;
pub mod directory;
pub mod short_names;
pub mod timestamps;

pub use constants::*;
pub use directory::*;
pub use short_names::*;
pub use timestamps::*;
