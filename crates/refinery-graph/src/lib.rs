pub mod injector;

pub use injector::{KgEntity, KgGraph, KgInjector, KgRelation};
