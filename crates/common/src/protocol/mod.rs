// Wire formats for the two remote boundaries.

pub mod live;
pub mod rest;
