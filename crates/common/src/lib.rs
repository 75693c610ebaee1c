// strata-common: shared types and pure logic for the Strata workspace tree

pub mod address;
pub mod path;
pub mod protocol;
pub mod types;
