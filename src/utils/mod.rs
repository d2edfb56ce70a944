pub mod card_cache;
