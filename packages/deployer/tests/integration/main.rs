
mod apply;
mod extract;
mod patch_store;
