use crate::lexer::{Lexer, Token};
use dsql_core::{Condition, Join, Operator, Query, QueryError, Result};
use tracing::debug;

/// Entry point turning SQL text into a [`Query`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlParser;

impl SqlParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, sql: &str) -> Result<Query> {
        let query = Parser::new(sql)?.parse()?;
        debug!(
            "Parse complete: {} tables, {} conditions, {} joins",
            query.from_tables.len(),
            query.where_conditions.len(),
            query.joins.len()
        );
        Ok(query)
    }
}

pub struct Parser {
    sql: String,
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(sql: &str) -> Result<Self> {
        if sql.trim().is_empty() {
            return Err(QueryError::ParseError("Empty query".to_string()));
        }
        let mut lexer = Lexer::new(sql);
        let tokens = lexer.tokenize()?;
        Ok(Self {
            sql: sql.trim().to_string(),
            tokens,
            position: 0,
        })
    }

    pub fn parse(&mut self) -> Result<Query> {
        self.parse_select()
    }

    fn parse_select(&mut self) -> Result<Query> {
        self.expect_token(&Token::Select)?;

        let mut query = Query::new(self.sql.clone());
        query.select_columns = self.parse_projection()?;

        self.expect_token(&Token::From)?;
        query.from_tables = self.parse_table_list()?;

        // JOIN and WHERE may come in either order
        let mut seen_where = false;
        loop {
            match self.current_token() {
                Token::Join | Token::Inner => {
                    if query.has_joins() {
                        return Err(QueryError::ParseError(
                            "Only one JOIN clause is supported".to_string(),
                        ));
                    }
                    let join = self.parse_join(&query.from_tables)?;
                    if !query
                        .from_tables
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(&join.right_table))
                    {
                        query.from_tables.push(join.right_table.clone());
                    }
                    query.joins.push(join);
                }
                Token::Where => {
                    if seen_where {
                        return Err(QueryError::ParseError(
                            "Duplicate WHERE clause".to_string(),
                        ));
                    }
                    self.advance();
                    query.where_conditions = self.parse_conditions()?;
                    seen_where = true;
                }
                _ => break,
            }
        }

        self.match_token(&Token::Semicolon);
        if self.current_token() != &Token::Eof {
            return Err(QueryError::ParseError(format!(
                "Unexpected token {:?}",
                self.current_token()
            )));
        }

        Ok(query)
    }

    fn parse_projection(&mut self) -> Result<Vec<String>> {
        let mut columns = vec![];

        loop {
            match self.current_token() {
                Token::Star => {
                    self.advance();
                    columns.push("*".to_string());
                }
                Token::Count => {
                    self.advance();
                    self.expect_token(&Token::LeftParen)?;
                    self.expect_token(&Token::Star)?;
                    self.expect_token(&Token::RightParen)?;
                    columns.push("COUNT(*)".to_string());
                }
                _ => columns.push(self.parse_column_ref()?),
            }

            if !self.match_token(&Token::Comma) {
                break;
            }
        }

        Ok(columns)
    }

    fn parse_table_list(&mut self) -> Result<Vec<String>> {
        let mut tables = vec![self.parse_identifier()?];
        while self.match_token(&Token::Comma) {
            tables.push(self.parse_identifier()?);
        }
        Ok(tables)
    }

    fn parse_join(&mut self, from_tables: &[String]) -> Result<Join> {
        self.match_token(&Token::Inner);
        self.expect_token(&Token::Join)?;

        let right_table = self.parse_identifier()?;
        let left_table = from_tables
            .last()
            .cloned()
            .ok_or_else(|| QueryError::ParseError("JOIN without FROM table".to_string()))?;

        self.expect_token(&Token::On)?;
        let first = self.parse_column_ref()?;
        self.expect_token(&Token::Equal)?;
        let second = self.parse_column_ref()?;

        // ON may name the right table's column first
        let (left_column, right_column) = match qualifier(&first) {
            Some(table) if table.eq_ignore_ascii_case(&right_table) => (second, first),
            _ => (first, second),
        };

        Ok(Join::inner(left_table, right_table, left_column, right_column))
    }

    fn parse_conditions(&mut self) -> Result<Vec<Condition>> {
        let mut conditions = vec![self.parse_condition()?];

        loop {
            match self.current_token() {
                Token::And => {
                    self.advance();
                    conditions.push(self.parse_condition()?);
                }
                Token::Or => {
                    return Err(QueryError::ParseError(
                        "OR conditions are not supported".to_string(),
                    ));
                }
                _ => break,
            }
        }

        Ok(conditions)
    }

    fn parse_condition(&mut self) -> Result<Condition> {
        let column = self.parse_column_ref()?;

        let operator = match self.current_token() {
            Token::Equal => Operator::Equals,
            Token::NotEqual => Operator::NotEquals,
            Token::Greater => Operator::GreaterThan,
            Token::Less => Operator::LessThan,
            Token::GreaterEqual => Operator::GreaterThanEquals,
            Token::LessEqual => Operator::LessThanEquals,
            Token::Like => Operator::Like,
            Token::In => Operator::In,
            other => {
                return Err(QueryError::ParseError(format!(
                    "Expected comparison operator after '{}', found {:?}",
                    column, other
                )));
            }
        };
        self.advance();

        if operator == Operator::In {
            self.expect_token(&Token::LeftParen)?;
            let mut items = vec![self.parse_literal()?];
            while self.match_token(&Token::Comma) {
                items.push(self.parse_literal()?);
            }
            self.expect_token(&Token::RightParen)?;
            return Ok(Condition::in_values(column, items));
        }

        let value = self.parse_literal()?;
        Ok(Condition::new(column, operator, value))
    }

    fn parse_literal(&mut self) -> Result<String> {
        let value = match self.current_token() {
            Token::String(s) | Token::Number(s) | Token::Identifier(s) => s.clone(),
            Token::True => "true".to_string(),
            Token::False => "false".to_string(),
            other => {
                return Err(QueryError::ParseError(format!(
                    "Expected literal, found {:?}",
                    other
                )));
            }
        };
        self.advance();
        Ok(value)
    }

    /// `column` or `table.column`
    fn parse_column_ref(&mut self) -> Result<String> {
        let name = self.parse_identifier()?;
        if self.match_token(&Token::Dot) {
            let column = self.parse_identifier()?;
            return Ok(format!("{}.{}", name, column));
        }
        Ok(name)
    }

    fn parse_identifier(&mut self) -> Result<String> {
        match self.current_token() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(QueryError::ParseError(format!(
                "Expected identifier, found {:?}",
                other
            ))),
        }
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.current_token() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, token: &Token) -> Result<()> {
        if self.current_token() == token {
            self.advance();
            Ok(())
        } else {
            Err(QueryError::ParseError(format!(
                "Expected {:?}, found {:?}",
                token,
                self.current_token()
            )))
        }
    }
}

fn qualifier(column: &str) -> Option<&str> {
    column.split_once('.').map(|(table, _)| table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsql_core::{DataType, QueryType};

    fn parse(sql: &str) -> Result<Query> {
        SqlParser::new().parse(sql)
    }

    #[test]
    fn test_simple_select_with_condition() {
        let query = parse("SELECT name, age FROM users WHERE age > 30").unwrap();

        assert_eq!(query.query_type, QueryType::Select);
        assert_eq!(query.from_tables, vec!["users"]);
        assert_eq!(query.select_columns, vec!["name", "age"]);
        assert_eq!(query.where_conditions.len(), 1);

        let cond = &query.where_conditions[0];
        assert_eq!(cond.column, "age");
        assert_eq!(cond.operator, Operator::GreaterThan);
        assert_eq!(cond.value, "30");
        assert_eq!(cond.data_type, DataType::Integer);
    }

    #[test]
    fn test_query_id_and_sql() {
        let query = parse("  SELECT * FROM users;  ").unwrap();
        assert!(query.id.as_str().starts_with("query_"));
        assert_eq!(query.id.as_str().len(), "query_".len() + 8);
        assert_eq!(query.sql, "SELECT * FROM users;");
        assert!(query.selects_all());
    }

    #[test]
    fn test_quoted_literals_are_unquoted() {
        let query = parse(
            "select * from orders where status = 'completed' and order_date >= '2024-01-15' and amount < 99.5",
        )
        .unwrap();

        let conds = &query.where_conditions;
        assert_eq!(conds.len(), 3);
        assert_eq!(conds[0].value, "completed");
        assert_eq!(conds[0].data_type, DataType::String);
        assert_eq!(conds[1].operator, Operator::GreaterThanEquals);
        assert_eq!(conds[1].data_type, DataType::Date);
        assert_eq!(conds[2].data_type, DataType::Double);
    }

    #[test]
    fn test_not_equals_spellings() {
        let a = parse("SELECT * FROM users WHERE age != 30").unwrap();
        let b = parse("SELECT * FROM users WHERE age <> 30").unwrap();
        assert_eq!(a.where_conditions[0].operator, Operator::NotEquals);
        assert_eq!(b.where_conditions[0].operator, Operator::NotEquals);
    }

    #[test]
    fn test_boolean_literal() {
        let query = parse("SELECT * FROM users WHERE active = TRUE").unwrap();
        assert_eq!(query.where_conditions[0].value, "true");
        assert_eq!(query.where_conditions[0].data_type, DataType::Boolean);
    }

    #[test]
    fn test_like_and_in() {
        let query =
            parse("SELECT name FROM users WHERE name LIKE 'A%' AND age IN (25, 30, 35)").unwrap();

        assert_eq!(query.where_conditions[0].operator, Operator::Like);
        assert_eq!(query.where_conditions[0].value, "A%");
        assert_eq!(query.where_conditions[1].operator, Operator::In);
        assert_eq!(query.where_conditions[1].in_list(), ["25", "30", "35"]);
        assert_eq!(query.where_conditions[1].data_type, DataType::Integer);
    }

    #[test]
    fn test_in_literal_with_comma() {
        let query = parse("SELECT * FROM users WHERE city IN ('New York, NY', 'Austin')").unwrap();
        let cond = &query.where_conditions[0];
        assert_eq!(cond.in_list(), ["New York, NY", "Austin"]);
        assert_eq!(cond.data_type, DataType::String);
    }

    #[test]
    fn test_or_is_rejected() {
        let err = parse("SELECT * FROM users WHERE age > 30 OR age < 20").unwrap_err();
        assert!(matches!(err, QueryError::ParseError(_)));
    }

    #[test]
    fn test_count_star() {
        let query = parse("SELECT COUNT(*) FROM orders").unwrap();
        assert!(query.is_count());
    }

    #[test]
    fn test_join_before_where() {
        let query = parse(
            "SELECT users.name, orders.amount FROM users JOIN orders ON users.user_id = orders.user_id WHERE orders.amount > 100",
        )
        .unwrap();

        assert_eq!(query.from_tables, vec!["users", "orders"]);
        assert_eq!(query.joins.len(), 1);
        let join = &query.joins[0];
        assert_eq!(join.left_table, "users");
        assert_eq!(join.right_table, "orders");
        assert_eq!(join.left_column, "users.user_id");
        assert_eq!(join.right_column, "orders.user_id");
        assert_eq!(query.where_conditions[0].column, "orders.amount");
    }

    #[test]
    fn test_join_after_where_and_swapped_on() {
        let query = parse(
            "SELECT * FROM users WHERE age > 30 INNER JOIN orders ON orders.user_id = users.user_id",
        )
        .unwrap();

        let join = &query.joins[0];
        assert_eq!(join.left_column, "users.user_id");
        assert_eq!(join.right_column, "orders.user_id");
        assert_eq!(query.where_conditions.len(), 1);
    }

    #[test]
    fn test_second_join_is_rejected() {
        let err = parse(
            "SELECT * FROM users JOIN orders ON user_id = user_id JOIN products ON product = product_id",
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::ParseError(_)));
    }

    #[test]
    fn test_join_table_not_duplicated() {
        let query = parse("SELECT * FROM users, orders JOIN orders ON user_id = user_id").unwrap();
        assert_eq!(query.from_tables, vec!["users", "orders"]);
        assert_eq!(query.joins[0].left_table, "orders");
    }

    #[test]
    fn test_multiple_tables_without_join() {
        let query = parse("SELECT * FROM users, orders, products").unwrap();
        assert_eq!(query.from_tables.len(), 3);
        assert!(!query.has_joins());
    }

    #[test]
    fn test_malformed_queries() {
        assert!(parse("").is_err());
        assert!(parse("SELECT name").is_err());
        assert!(parse("SELECT FROM users").is_err());
        assert!(parse("SELECT * FROM users WHERE age").is_err());
        assert!(parse("SELECT * FROM users WHERE age > 30 garbage").is_err());
        assert!(parse("DELETE FROM users").is_err());
    }
}
