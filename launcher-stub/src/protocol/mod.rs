//! Bootstrap skeleton shared by the isolate and VM protocols.
//!
//! A build links exactly one protocol; [`bootstrap`] drives it through
//! load, resolve, create, marshal and invoke.

use std::path::PathBuf;
use std::ptr::NonNull;

use log::debug;

use crate::args::HostArgs;
use crate::error::LaunchError;
use crate::loader::{LibraryLoader, SymbolSource};
use crate::options::{self, OptionInputs, OptionList};

pub mod isolate;
pub mod vm;

pub use isolate::IsolateProtocol;
pub use vm::{VmDispatch, VmProtocol};

/// A runtime's process-wide container paired with the calling thread's
/// attachment to it. Both belong to the runtime; the launcher only borrows
/// them for the single entry call.
#[derive(Debug)]
pub struct RuntimeContext<C, T> {
    pub container: NonNull<C>,
    pub thread: T,
}

pub trait Protocol {
    const NAME: &'static str;

    /// Whether runtime creation consumes the option list.
    const TAKES_OPTIONS: bool;

    type Symbols;
    type Runtime;
    type EntryArgs<'a>
    where
        Self::Runtime: 'a;

    fn resolve(&self, library: &dyn SymbolSource) -> Result<Self::Symbols, LaunchError>;

    fn create_runtime(
        &self,
        symbols: &Self::Symbols,
        options: &OptionList,
    ) -> Result<Self::Runtime, LaunchError>;

    fn marshal_args<'a>(
        &self,
        runtime: &'a Self::Runtime,
        args: &'a mut HostArgs,
    ) -> Result<Self::EntryArgs<'a>, LaunchError>;

    /// Calls the entry point once and returns the process exit code.
    fn invoke(
        &self,
        symbols: &Self::Symbols,
        runtime: &Self::Runtime,
        args: Self::EntryArgs<'_>,
    ) -> Result<i32, LaunchError>;
}

/// Everything decided before the library is touched.
#[derive(Debug, Clone)]
pub struct LaunchPlan<'a> {
    pub library_path: PathBuf,
    pub option_inputs: OptionInputs<'a>,
}

pub fn bootstrap<P, L>(
    protocol: &P,
    loader: &L,
    plan: &LaunchPlan<'_>,
    args: &mut HostArgs,
) -> Result<i32, LaunchError>
where
    P: Protocol,
    L: LibraryLoader,
{
    debug!("Using {} protocol", P::NAME);
    let library = loader.open(&plan.library_path)?;
    let symbols = protocol.resolve(&library)?;

    let options = if P::TAKES_OPTIONS {
        let options = options::build(&plan.option_inputs)?;
        debug!("Adding vm options:");
        for option in options.iter() {
            debug!("{}", option.to_string_lossy());
        }
        options
    } else {
        OptionList::with_capacity(0)
    };

    let runtime = protocol.create_runtime(&symbols, &options)?;
    // The runtime copies what it needs during creation.
    drop(options);

    let entry_args = protocol.marshal_args(&runtime, args)?;
    protocol.invoke(&symbols, &runtime, entry_args)
}
