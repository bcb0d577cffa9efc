use lazy_static::lazy_static;
use proc_macro2::Ident;
use quote::quote;
use std::collections::{BTreeMap, HashSet};
use syn::parse::Parser;
use syn::visit::Visit;

lazy_static! {
    /// Names that are never treated as streams, even when used as bare paths.
    static ref EXEMPT_IDENTIFIERS: HashSet<&'static str> = {
        let mut m = HashSet::new();
        m.insert("i8");
        m.insert("u8");
        m.insert("i16");
        m.insert("u16");
        m.insert("i32");
        m.insert("u32");
        m.insert("i64");
        m.insert("u64");
        m.insert("i128");
        m.insert("u128");
        m.insert("isize");
        m.insert("usize");
        m.insert("f32");
        m.insert("f64");
        m.insert("bool");
        m.insert("char");
        m.insert("str");
        m.insert("self");
        m
    };
}

/// Expands a block of statements into a reactive expression stream.
///
/// Every free variable of the block is taken to be a `Stream` and is read with `Tracker::get`,
/// so the block re-runs whenever any of them emits. The block's value is the emitted value.
/// Variables only mentioned inside nested macro invocations are not seen.
#[proc_macro]
pub fn computed(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let stmts = match syn::Block::parse_within.parse(input) {
        Ok(stmts) => stmts,
        Err(err) => return err.to_compile_error().into(),
    };

    let mut visitor = FreeVarVisitor::default();
    for stmt in &stmts {
        visitor.visit_stmt(stmt);
    }
    let streams: Vec<&Ident> = visitor
        .idents
        .iter()
        .filter(|(name, _)| !visitor.local_idents.contains(*name))
        .filter(|(name, _)| !EXEMPT_IDENTIFIERS.contains(name.as_str()))
        .map(|(_, ident)| ident)
        .collect();

    proc_macro::TokenStream::from(quote! {
        {
            #(let #streams = ::core::clone::Clone::clone(&#streams);
            )*
            ::rill::expr(move |__tracker| {
                #(let #streams = __tracker.get(&#streams)?;
                )*
                ::core::result::Result::Ok({ #(#stmts)* })
            })
        }
    })
}

/// Collects single-segment paths used as values, and every name bound by a pattern.
#[derive(Default)]
struct FreeVarVisitor {
    idents: BTreeMap<String, Ident>,
    local_idents: HashSet<String>,
}

impl<'ast> Visit<'ast> for FreeVarVisitor {
    fn visit_expr_path(&mut self, expr: &'ast syn::ExprPath) {
        if expr.qself.is_some() || expr.path.segments.len() != 1 {
            return;
        }
        let ident = &expr.path.segments[0].ident;
        let name = ident.to_string();
        // Constants, unit structs and enum variants.
        if name.starts_with(|c: char| c.is_uppercase()) {
            return;
        }
        self.idents.entry(name).or_insert_with(|| ident.clone());
    }

    fn visit_expr_call(&mut self, call: &'ast syn::ExprCall) {
        // `f(x)` calls a function; only its arguments can be streams.
        if !matches!(*call.func, syn::Expr::Path(_)) {
            self.visit_expr(&call.func);
        }
        for arg in &call.args {
            self.visit_expr(arg);
        }
    }

    fn visit_pat_ident(&mut self, pat: &'ast syn::PatIdent) {
        self.local_idents.insert(pat.ident.to_string());
        if let Some((_, subpat)) = &pat.subpat {
            self.visit_pat(subpat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FreeVarVisitor;
    use syn::visit::Visit;

    fn free_vars(source: &str) -> Vec<String> {
        let block: syn::Block = syn::parse_str(&format!("{{ {} }}", source)).expect("valid block");
        let mut visitor = FreeVarVisitor::default();
        visitor.visit_block(&block);
        visitor
            .idents
            .keys()
            .filter(|name| !visitor.local_idents.contains(*name))
            .cloned()
            .collect()
    }

    #[test]
    fn finds_free_variables() {
        assert_eq!(free_vars("let y = 3; x + y"), vec!["x"]);
        assert_eq!(free_vars("a.len() + b.field"), vec!["a", "b"]);
    }

    #[test]
    fn skips_functions_constants_and_closure_params() {
        assert_eq!(free_vars("max(a, MAX) + Some(b).map(|v| v + c).unwrap_or(0)"), vec![
            "a", "b", "c"
        ]);
        assert!(free_vars("i32::MAX").is_empty());
    }
}
