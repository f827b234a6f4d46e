mod current;
mod graph;
mod helpers;
mod status;
mod summary;
