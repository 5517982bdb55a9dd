pub mod case_insensitive_map;
