//! Behavioural scenarios for the backup, restore, and cleanup workflows.

mod archive;
