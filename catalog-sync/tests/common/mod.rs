use catalog_core::CoherenceConfig;
use catalog_sync::{CoherenceServices, StoreSet};
use catalog_test_utils::MemoryStores;

pub fn store_set(stores: &MemoryStores) -> StoreSet {
    StoreSet {
        cache: stores.cache.clone(),
        kv: stores.kv.clone(),
        search: stores.search.clone(),
        primary: stores.primary.clone(),
        details: stores.details.clone(),
        views: stores.views.clone(),
    }
}

pub fn services(stores: &MemoryStores, config: CoherenceConfig) -> CoherenceServices {
    CoherenceServices::new(store_set(stores), config, stores.clock.clone())
}
