#![recursion_limit="256"]
extern crate proc_macro;
extern crate proc_macro2;
#[macro_use]
extern crate syn;
#[macro_use]
extern crate quote;

mod decl;
mod module;

use decl::*;

use syn::{Ident, LitStr};
use syn::parse::{Parse, Result, Error, ParseStream};

#[proc_macro]
pub fn grammar_impl(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let Decls(decls) = parse_macro_input!(input);
    let module = module::GrammarModule::new_from_decls(decls);
    let expanded = module.and_then(|m| m.build());

    match expanded {
        Ok(expanded) => expanded.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

struct Decls(Vec<Decl>);

impl Parse for Decls {
    fn parse(input: ParseStream) -> Result<Decls> {
        let mut decls = Vec::new();
        while !input.is_empty() {
            decls.push(input.parse()?);
        }
        Ok(Decls(decls))
    }
}

mod kw {
    custom_keyword!(module);
    custom_keyword!(grammar);
    custom_keyword!(include);
    custom_keyword!(host);
    custom_keyword!(extends);
}

fn parse_host_name(input: ParseStream) -> Result<HostName> {
    let lookahead = input.lookahead1();
    if lookahead.peek(LitStr) {
        Ok(input.parse::<LitStr>()?.into())
    } else if lookahead.peek(Ident) {
        Ok(input.parse::<Ident>()?.into())
    } else {
        Err(lookahead.error())
    }
}

impl Parse for Decl {
    fn parse(input: ParseStream) -> Result<Decl> {
        input
            .parse::<Token![%]>()
            .map_err(|e| Error::new(e.span(), "% expected"))?;
        let lookahead = input.lookahead1();
        let decl = if lookahead.peek(kw::module) {
            // %module name;
            input.parse::<kw::module>()?;
            Decl::Module(input.parse()?)
        } else if lookahead.peek(kw::grammar) {
            // %grammar "text";
            input.parse::<kw::grammar>()?;
            Decl::Grammar(input.parse()?)
        } else if lookahead.peek(kw::include) {
            // %include { rust-code } [;]
            input.parse::<kw::include>()?;
            let code;
            braced!(code in input);
            let mut items = Vec::new();
            while !code.is_empty() {
                items.push(code.parse()?);
            }
            if input.peek(Token![;]) {
                input.parse::<Token![;]>()?;
            }
            return Ok(Decl::Include(items));
        } else if lookahead.peek(kw::host) {
            // %host name = expr;
            input.parse::<kw::host>()?;
            let name = parse_host_name(input)?;
            input.parse::<Token![=]>()?;
            Decl::Host(name, input.parse()?)
        } else if lookahead.peek(Token![const]) {
            // %const name = expr;
            input.parse::<Token![const]>()?;
            let name = parse_host_name(input)?;
            input.parse::<Token![=]>()?;
            Decl::Const(name, input.parse()?)
        } else if lookahead.peek(kw::extends) {
            // %extends path::to::module;
            input.parse::<kw::extends>()?;
            Decl::Extends(input.parse()?)
        } else {
            return Err(lookahead.error());
        };
        input.parse::<Token![;]>()?;
        Ok(decl)
    }
}
