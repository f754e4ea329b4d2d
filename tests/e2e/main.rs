//! End-to-end scenarios for the Insait session store.

mod harness;
mod scenarios;
