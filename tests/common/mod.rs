#![allow(dead_code)]

pub(crate) mod arriving_db;

pub(crate) mod fixtures;

pub(crate) mod logging;

pub(crate) mod mem_db;

pub(crate) mod requester;
