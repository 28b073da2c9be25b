pub mod clients;
pub mod config;
pub mod contexts;
pub mod data;

#[cfg(test)]
pub(crate) mod test_support;
