//! BDD harness for the archive workflows.

mod bdd_steps;
mod scenarios;
mod test_helpers;
