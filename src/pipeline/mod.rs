pub mod modulator;
pub mod persistence;
pub mod project;
pub mod serialize;
pub mod test_fixture;
