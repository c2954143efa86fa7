pub mod cleanup;
pub mod run;
pub mod sample;
