pub mod crawler;
pub mod pagination;
pub mod web;

#[cfg(test)]
mod tests;
