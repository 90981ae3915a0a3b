pub mod tally_reporter;
