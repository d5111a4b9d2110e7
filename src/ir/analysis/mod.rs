//! Scoping, typing and validation of neuron models.

pub mod cocos;
pub mod predefined;
pub mod scope;
pub mod symbol_table;
pub mod symbols;
pub mod type_checker;
pub mod type_symbol;
pub mod units;
