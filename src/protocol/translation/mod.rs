//! Rule-driven translation: the rule table, its concurrent publication and
//! the per-destination frame composer used by the bridge runner.
pub mod composer;
pub mod shared_table;
pub mod table;
