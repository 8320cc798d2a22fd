//! x86_64 bootstrap stage progress output, generated by
//! [`crate::define_bootstrap_stages`] over the early serial console.

use crate::early_println;

crate::define_bootstrap_stages!(early_println);
