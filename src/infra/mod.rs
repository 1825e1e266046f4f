pub mod restbus;
