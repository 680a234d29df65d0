pub mod allocation_service;
pub mod deletion_service;
pub mod ledger_service;
pub mod schedule_service;
pub mod status_service;

#[cfg(test)]
pub(crate) mod test_support;
