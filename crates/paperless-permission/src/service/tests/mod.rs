mod common;
mod generation;
mod lifecycle;
mod notifications;
mod signatures;
