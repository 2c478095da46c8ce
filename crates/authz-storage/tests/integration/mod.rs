mod casbin_adapter;
mod memory_store;
mod sql_store;
