//! Pattern-keyed filter registries for identifiers and values.

pub mod configurable;
pub mod crypto;
pub mod identifiers;
pub mod inflector;
pub mod registry;
pub mod values;

pub use configurable::{ConfigurableFilters, MappingValue, Mappings, TransformKind};
pub use crypto::{AesCryptograph, Cryptograph};
pub use identifiers::IdentifiersFilters;
pub use inflector::{EnglishInflector, Inflector};
pub use registry::{Filters, Mapped};
pub use values::{FiltersSet, ValueFilters};
