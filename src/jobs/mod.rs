pub mod sync_reconciliation;
