mod hereditary_stratigraphic_column;
mod stratum;

pub use hereditary_stratigraphic_column::HereditaryStratigraphicColumn;
pub use stratum::{Annotation, Stratum};
