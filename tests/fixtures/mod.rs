//! Catalogs shared by the integration tests.
#![allow(dead_code)]

use mdlsql::mdl::{
    Column, CumulativeMetric, JoinType, Measure, Metric, Model, Relationship, TimeGrain,
    TimeUnit, View, Window,
};
use mdlsql::{Catalog, Manifest, SessionContext};

pub fn session() -> SessionContext {
    SessionContext::new("accio", "tpch")
}

fn orders() -> Model {
    Model::new("Orders", "select * from main.orders")
        .with_column(Column::new("orderkey", "INTEGER"))
        .with_column(Column::new("custkey", "INTEGER"))
        .with_column(Column::new("orderstatus", "VARCHAR"))
        .with_column(Column::new("totalprice", "DOUBLE"))
        .with_column(Column::new("orderdate", "DATE"))
        .with_primary_key("orderkey")
}

fn customer() -> Model {
    Model::new("Customer", "select * from main.customer")
        .with_column(Column::new("custkey", "INTEGER"))
        .with_column(Column::new("name", "VARCHAR"))
        .with_column(Column::new("nationkey", "INTEGER"))
        .with_primary_key("custkey")
}

fn lineitem() -> Model {
    Model::new("Lineitem", "select * from main.lineitem")
        .with_column(Column::new("orderkey", "INTEGER"))
        .with_column(Column::new("linenumber", "INTEGER"))
        .with_column(Column::new("extendedprice", "DOUBLE"))
        .with_column(Column::new("discount", "DOUBLE"))
        .with_column(Column::new("shipdate", "DATE"))
        .with_column(Column::calculated(
            "orderkey_linenumber",
            "VARCHAR",
            "concat(orderkey, '-', linenumber)",
        ))
        .with_primary_key("orderkey_linenumber")
}

fn orders_customer() -> Relationship {
    Relationship::new(
        "OrdersCustomer",
        "Orders",
        "Customer",
        JoinType::ManyToOne,
        "Orders.custkey = Customer.custkey",
    )
}

fn orders_lineitem() -> Relationship {
    Relationship::new(
        "OrdersLineitem",
        "Orders",
        "Lineitem",
        JoinType::OneToMany,
        "Orders.orderkey = Lineitem.orderkey",
    )
}

/// TPCH-style catalog with relationships, metrics and views.
pub fn tpch() -> Catalog {
    let manifest = Manifest::new("accio", "tpch")
        .with_model(
            orders()
                .with_column(Column::relationship("customer", "Customer", "OrdersCustomer"))
                .with_column(Column::relationship("lineitem", "Lineitem", "OrdersLineitem"))
                .with_column(Column::calculated("customer_name", "VARCHAR", "customer.name")),
        )
        .with_model(
            customer()
                .with_column(Column::relationship("orders", "Orders", "OrdersCustomer"))
                .with_column(Column::calculated(
                    "total_price",
                    "DOUBLE",
                    "sum(orders.totalprice)",
                )),
        )
        .with_model(
            lineitem().with_column(Column::relationship("orders", "Orders", "OrdersLineitem")),
        )
        .with_relationship(orders_customer())
        .with_relationship(orders_lineitem())
        .with_metric(
            Metric::new("Revenue", "Orders")
                .with_dimension(Column::new("custkey", "INTEGER"))
                .with_dimension(Column::new("orderdate", "DATE"))
                .with_measure(Column::calculated("revenue", "DOUBLE", "sum(totalprice)"))
                .with_time_grain(TimeGrain::new(
                    "orderdate",
                    "orderdate",
                    vec![TimeUnit::Year, TimeUnit::Quarter, TimeUnit::Month],
                )),
        )
        .with_metric(
            Metric::new("CustomerRevenue", "Orders")
                .with_dimension(Column::calculated("customer_name", "VARCHAR", "customer.name"))
                .with_measure(Column::calculated("revenue", "DOUBLE", "sum(totalprice)")),
        )
        .with_cumulative_metric(CumulativeMetric::new(
            "WeeklyRevenue",
            "Orders",
            Measure::new("total", "DOUBLE", "sum", "totalprice"),
            Window::new("orderdate", "orderdate", TimeUnit::Week, "1994-01-01", "1994-12-31"),
        ))
        .with_view(View::new("CustomerNames", "select name from Customer"))
        .with_view(View::new("TopRevenue", "select * from Revenue where revenue > 100"))
        .with_view(View::new("LoopA", "select * from LoopB"))
        .with_view(View::new("LoopB", "select * from LoopA"));
    Catalog::new(manifest).expect("tpch catalog")
}

/// The catalog the lineage tests walk: calculated columns over both relationships.
pub fn tpch_lineage() -> Catalog {
    let manifest = Manifest::new("accio", "tpch")
        .with_model(
            customer()
                .with_column(Column::relationship("orders", "Orders", "OrdersCustomer"))
                .with_column(Column::calculated(
                    "total_price",
                    "BIGINT",
                    "sum(orders.totalprice)",
                ))
                .with_column(Column::calculated(
                    "discount_extended_price",
                    "BIGINT",
                    "sum(orders.lineitem.discount + orders.extended_price)",
                ))
                .with_column(Column::calculated(
                    "lineitem_price",
                    "BIGINT",
                    "sum(orders.lineitem.discount * orders.lineitem.extendedprice)",
                )),
        )
        .with_model(
            orders()
                .with_column(Column::relationship("customer", "Customer", "OrdersCustomer"))
                .with_column(Column::relationship("lineitem", "Lineitem", "OrdersLineitem"))
                .with_column(Column::calculated("customer_name", "BIGINT", "customer.name"))
                .with_column(Column::calculated(
                    "extended_price",
                    "BIGINT",
                    "sum(lineitem.extendedprice)",
                ))
                .with_column(Column::calculated(
                    "extended_price_2",
                    "BIGINT",
                    "sum(lineitem.extendedprice + totalprice)",
                )),
        )
        .with_model(
            lineitem()
                .with_column(Column::relationship("orders", "Orders", "OrdersLineitem"))
                .with_column(Column::calculated(
                    "test_column",
                    "BIGINT",
                    "orders.customer.total_price + extendedprice",
                )),
        )
        .with_relationship(orders_customer())
        .with_relationship(orders_lineitem());
    Catalog::new(manifest).expect("lineage catalog")
}

/// A model defined on top of another model.
pub fn model_on_model() -> Catalog {
    let manifest = Manifest::new("accio", "tpch")
        .with_model(
            orders()
                .with_column(Column::relationship("on_customer", "OnCustomer", "OrdersOnCustomer"))
                .with_column(Column::calculated("customer_name", "BIGINT", "on_customer.mom_name")),
        )
        .with_model(
            customer()
                .with_column(Column::relationship("orders", "Orders", "OrdersCustomer"))
                .with_column(Column::calculated(
                    "total_price",
                    "BIGINT",
                    "sum(orders.totalprice)",
                )),
        )
        .with_model(
            Model::on_base_object("OnCustomer", "Customer")
                .with_column(Column::new("mom_name", "VARCHAR").with_expression("name"))
                .with_column(Column::new("mom_custkey", "VARCHAR").with_expression("custkey"))
                .with_column(
                    Column::new("mom_totalprice", "VARCHAR").with_expression("total_price"),
                )
                .with_primary_key("mom_custkey"),
        )
        .with_relationship(Relationship::new(
            "OrdersOnCustomer",
            "Orders",
            "OnCustomer",
            JoinType::ManyToOne,
            "Orders.custkey = OnCustomer.mom_custkey",
        ))
        .with_relationship(orders_customer());
    Catalog::new(manifest).expect("model on model catalog")
}

/// A metric whose measure reads through a relationship.
pub fn metric_on_model() -> Catalog {
    let manifest = Manifest::new("accio", "tpch")
        .with_model(orders())
        .with_model(
            customer().with_column(Column::relationship("orders", "Orders", "OrdersCustomer")),
        )
        .with_metric(
            Metric::new("CustomerSpending", "Customer")
                .with_dimension(Column::new("name", "VARCHAR"))
                .with_measure(
                    Column::new("spending", "BIGINT").with_expression("sum(orders.totalprice)"),
                ),
        )
        .with_relationship(orders_customer());
    Catalog::new(manifest).expect("metric on model catalog")
}

/// Books and their authors, related one-to-one.
pub fn book_people() -> Catalog {
    let manifest = Manifest::new("accio", "tpch")
        .with_model(
            Model::new(
                "Book",
                "select * from (values (1, 'book1', 1), (2, 'book2', 2), (3, 'book3', 3)) Book(bookId, name, authorId)",
            )
            .with_column(Column::new("bookId", "INTEGER"))
            .with_column(Column::new("name", "VARCHAR"))
            .with_column(Column::relationship("author", "People", "BookPeople"))
            .with_column(Column::new("authorId", "INTEGER"))
            .with_primary_key("bookId"),
        )
        .with_model(
            Model::new(
                "People",
                "select * from (values (1, 'user1'), (2, 'user2'), (3, 'user3')) People(userId, name)",
            )
            .with_column(Column::new("userId", "INTEGER"))
            .with_column(Column::new("name", "VARCHAR"))
            .with_column(Column::relationship("book", "Book", "BookPeople"))
            .with_primary_key("userId"),
        )
        .with_relationship(Relationship::new(
            "BookPeople",
            "Book",
            "People",
            JoinType::OneToOne,
            "Book.authorId = People.userId",
        ));
    Catalog::new(manifest).expect("book catalog")
}
