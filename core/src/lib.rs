pub mod calendar;
pub mod db;
pub mod gateway;
pub mod local_store;
pub mod models;
pub mod reconcile;
pub mod service;
