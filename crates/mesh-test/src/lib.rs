//! `#[mesh_test]`: run an async test on its own current-thread runtime with
//! a hard wall-clock limit.
//!
//! ```ignore
//! #[mesh_test::mesh_test(timeout = 10, paused)]
//! async fn glare_resolves() { /* ... */ }
//! ```
//!
//! `paused` starts the runtime with tokio's clock frozen, so timers only
//! advance when every task is idle. The caller needs tokio's `test-util`
//! feature for that option.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, ItemFn, LitInt, ReturnType, parse_macro_input};

struct Options {
    timeout_secs: u64,
    paused: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            paused: false,
        }
    }
}

#[proc_macro_attribute]
pub fn mesh_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut options = Options::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("timeout") {
            let lit: LitInt = meta.value()?.parse()?;
            let secs: u64 = lit.base10_parse()?;
            if secs == 0 {
                return Err(meta.error("timeout must be greater than zero"));
            }
            options.timeout_secs = secs;
            Ok(())
        } else if meta.path.is_ident("paused") {
            options.paused = true;
            Ok(())
        } else {
            Err(meta.error("expected `timeout = <secs>` or `paused`"))
        }
    });
    parse_macro_input!(attr with parser);

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(&sig.ident, "mesh_test can only be applied to async functions")
            .to_compile_error()
            .into();
    }
    if !sig.inputs.is_empty() {
        return syn::Error::new_spanned(&sig.inputs, "mesh_test functions take no arguments")
            .to_compile_error()
            .into();
    }
    sig.asyncness = None;

    let output = match &sig.output {
        ReturnType::Default => quote! { () },
        ReturnType::Type(_, ty) => quote! { #ty },
    };

    let filtered_attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_test_attribute(attr))
        .collect();

    let timeout = options.timeout_secs;
    let clock = if options.paused {
        quote! { builder.start_paused(true); }
    } else {
        quote! {}
    };

    TokenStream::from(quote! {
        #[test]
        #(#filtered_attrs)*
        #vis #sig {
            let timeout_duration = std::time::Duration::from_secs(#timeout);
            let (sender, receiver) = std::sync::mpsc::channel::<std::thread::Result<#output>>();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let mut builder = tokio::runtime::Builder::new_current_thread();
                    builder.enable_all();
                    #clock
                    let runtime = builder.build().expect("failed to build Tokio runtime");
                    runtime.block_on(async {
                        tokio::time::timeout(timeout_duration, async move #block)
                            .await
                            .expect("test timed out")
                    })
                }));
                let _ = sender.send(result);
            });
            match receiver.recv_timeout(timeout_duration + std::time::Duration::from_secs(1)) {
                Ok(Ok(output)) => output,
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => panic!("test timed out"),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread failed before reporting result")
                }
            }
        }
    })
}

fn is_test_attribute(attr: &Attribute) -> bool {
    let segments: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    matches!(
        segments.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["test"] | ["tokio", "test"]
    )
}
