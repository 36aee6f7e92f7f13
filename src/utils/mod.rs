pub mod http;
pub mod text;

#[cfg(test)]
pub mod test_support;
