/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the crate's data types.

pub mod data_types;

pub mod chain_types;

pub mod vote_types;
