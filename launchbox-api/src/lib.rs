pub mod command;
pub mod resolved;
pub mod wrapper;

#[cfg(test)]
mod test_common;
