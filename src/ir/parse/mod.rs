//! Surface-syntax lexing and fragment parsing.

pub mod lexer;
pub mod parser;

pub use parser::{
    parse_assignment, parse_block, parse_data_type, parse_declaration, parse_declarations,
    parse_equation, parse_equations, parse_expression, parse_input_line, parse_input_lines,
    parse_statement,
};
