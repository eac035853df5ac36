// Table transformations shared by the source stages

pub mod affiliation;
pub mod authors;
pub mod cleaning;
pub mod columns;
pub mod dimension;
pub mod fact;
pub mod splitter;
pub mod unify;
