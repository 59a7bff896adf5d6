use crate::error::BindError;

/// What a handler parameter is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// The in-flight [`Request`](crate::Request).
    Request,
    /// The [`ResponseWriter`](crate::ResponseWriter) capability.
    Writer,
    /// A structured input decoded from the request, [`In<T>`](crate::In).
    Input,
}

/// One value a handler returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Value,
    Error,
}

/// The shape of a handler: its parameter kinds and output kinds, in order.
///
/// Typed handlers derive their signature from their Rust types, so several
/// violations below can only come from hand-built signatures. The rules are
/// the same either way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<ParamKind>,
    pub outputs: Vec<OutputKind>,
}

impl Signature {
    pub const MAX_PARAMS: usize = 3;

    pub fn new(params: Vec<ParamKind>, outputs: Vec<OutputKind>) -> Self {
        Self { params, outputs }
    }

    /// Whether the handler writes its own response.
    pub fn controls_writer(&self) -> bool {
        self.params.contains(&ParamKind::Writer)
    }

    /// Whether the handler returns a value to marshal.
    pub fn has_value(&self) -> bool {
        self.outputs.first() == Some(&OutputKind::Value)
    }

    pub fn validate(&self) -> Result<(), BindError> {
        if self.params.len() > Self::MAX_PARAMS {
            return Err(BindError::TooManyParameters(self.params.len()));
        }

        let inputs = self.params.iter().filter(|p| **p == ParamKind::Input).count();
        if inputs > 1 {
            return Err(BindError::MultipleInputTypes(inputs));
        }

        match self.outputs.as_slice() {
            [] | [OutputKind::Error] | [OutputKind::Value, OutputKind::Error] => {}
            other => return Err(BindError::InvalidReturnShape(other.to_vec())),
        }

        match (self.outputs.is_empty(), self.controls_writer()) {
            (true, false) => Err(BindError::HandlerMustSignalCompletion),
            (false, true) => Err(BindError::AmbiguousResponseOwnership),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use ParamKind::{Input, Request, Writer};
    use OutputKind::{Error, Value};

    #[rstest]
    #[case(vec![], vec![Error])]
    #[case(vec![Request], vec![Value, Error])]
    #[case(vec![Input, Request], vec![Error])]
    #[case(vec![Writer], vec![])]
    #[case(vec![Request, Writer, Input], vec![])]
    #[case(vec![Request, Request, Input], vec![Value, Error])]
    fn accepts(#[case] params: Vec<ParamKind>, #[case] outputs: Vec<OutputKind>) {
        assert_eq!(Signature::new(params, outputs).validate(), Ok(()));
    }

    #[rstest]
    #[case(vec![Request, Request, Request, Request], vec![Error], BindError::TooManyParameters(4))]
    #[case(vec![Input, Input], vec![Error], BindError::MultipleInputTypes(2))]
    #[case(vec![], vec![Value], BindError::InvalidReturnShape(vec![Value]))]
    #[case(vec![], vec![Error, Value], BindError::InvalidReturnShape(vec![Error, Value]))]
    #[case(vec![], vec![Value, Value, Error], BindError::InvalidReturnShape(vec![Value, Value, Error]))]
    #[case(vec![Request], vec![], BindError::HandlerMustSignalCompletion)]
    #[case(vec![], vec![], BindError::HandlerMustSignalCompletion)]
    fn rejects(
        #[case] params: Vec<ParamKind>,
        #[case] outputs: Vec<OutputKind>,
        #[case] expected: BindError,
    ) {
        assert_eq!(Signature::new(params, outputs).validate(), Err(expected));
    }

    #[rstest]
    #[case(vec![Writer])]
    #[case(vec![Writer, Request])]
    #[case(vec![Request, Writer])]
    #[case(vec![Writer, Request, Input])]
    #[case(vec![Request, Writer, Input])]
    #[case(vec![Request, Input, Writer])]
    fn writer_with_outputs_is_ambiguous(#[case] params: Vec<ParamKind>) {
        for outputs in [vec![Error], vec![Value, Error]] {
            let sig = Signature::new(params.clone(), outputs);
            assert_eq!(sig.validate(), Err(BindError::AmbiguousResponseOwnership));
        }
    }

    #[test]
    fn value_detection() {
        assert!(Signature::new(vec![], vec![Value, Error]).has_value());
        assert!(!Signature::new(vec![], vec![Error]).has_value());
    }
}
