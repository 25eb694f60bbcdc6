pub mod factory;
pub mod publish;
pub mod rscript;
