mod domain_xml;
mod inject;
mod provision;

pub use domain_xml::{DomainXmlArgs, domain_xml};
pub use inject::{InjectArgs, inject};
pub use provision::{ProvisionArgs, provision};
