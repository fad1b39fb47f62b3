mod invariants;
mod scenarios;
mod test_utils;
